//! Merge scheduler: admission, merge insertion and cascade repair.
//!
//! Admissions are serialized by a single mutex around [`state::SchedulerState`].
//! Every completed admission publishes an immutable [`ScheduleSnapshot`]
//! through an `ArcSwap`, which is what the per-tick control path and the
//! diagnostics worker read, without taking the lock.

mod merge;
mod state;
#[cfg(test)]
mod tests;

pub use merge::MergePlan;
pub use state::AdmissionRecord;

use crate::config::SchedulerConfig;
use crate::diagnostics::{ConsistencyReport, DiagnosticsWorker};
use crate::error::{ConfigError, PlanError, ScheduleError};
use crate::logging::log;
use crate::models::{CommitmentRecord, LaneId, Sample, Stream, Trajectory, TrajectoryFrame, VehicleId};
use crate::planner::{plan_follow, plan_mono, LeaderView, StartState, VehiclePlan};
use crate::simulation::Simulation;
use crate::topology::resolve_lane_chain;
use arc_swap::ArcSwap;
use state::{ScheduledVehicle, SchedulerState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Immutable view of the schedule as of the last completed admission
#[derive(Debug, Clone, Default)]
pub struct ScheduleSnapshot {
    pub trajectories: HashMap<VehicleId, Arc<Trajectory>>,
    pub commitments: Vec<CommitmentRecord>,
}

impl ScheduleSnapshot {
    #[must_use]
    pub fn sample_at(&self, vehicle: &VehicleId, time: f64) -> Option<&Sample> {
        self.trajectories.get(vehicle)?.sample_at_or_after(time)
    }
}

/// Result of a successful admission
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionOutcome {
    pub vehicle_id: VehicleId,
    pub stream: Stream,
    pub commitment: CommitmentRecord,
    /// Vehicles re-planned because this one now merges ahead of them
    pub cascaded: Vec<VehicleId>,
    /// Vehicles withdrawn because their re-plan failed
    pub withdrawn: Vec<VehicleId>,
    /// Entry-time retries needed before the merge plan succeeded
    pub retries: usize,
}

#[cfg(feature = "perf_timing")]
mod timing {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    pub static ADMISSION_TIME: AtomicU64 = AtomicU64::new(0);
    pub static ADMISSIONS: AtomicU64 = AtomicU64::new(0);
    pub static CASCADED: AtomicU64 = AtomicU64::new(0);

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_duration(counter: &AtomicU64, duration: Duration) {
        counter.fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn withdraw<S: Simulation + ?Sized>(simulation: &mut S, vehicle: &VehicleId) {
    if let Err(error) = simulation.remove_vehicle(vehicle) {
        log::warn!("Failed to withdraw {vehicle}: {error}");
    }
}

pub struct MergeScheduler {
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    published: Arc<ArcSwap<ScheduleSnapshot>>,
    diagnostics: Mutex<Option<DiagnosticsWorker>>,
}

impl MergeScheduler {
    /// Validate `config` and build an empty scheduler. Starts the
    /// diagnostics worker when the config asks for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid.
    pub fn new(config: SchedulerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let scheduler = Self {
            config,
            state: Mutex::new(SchedulerState::default()),
            published: Arc::new(ArcSwap::from_pointee(ScheduleSnapshot::default())),
            diagnostics: Mutex::new(None),
        };
        if scheduler.config.diagnostics {
            if let Err(error) = scheduler.start_diagnostics() {
                log::warn!("Diagnostics disabled: {error}");
            }
        }
        Ok(scheduler)
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Start the background consistency observer if it is not running.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn start_diagnostics(&self) -> std::io::Result<()> {
        let mut diagnostics = lock_or_recover(&self.diagnostics);
        if diagnostics.is_none() {
            let interval = Duration::from_millis(self.config.diagnostics_interval_ms.max(1));
            *diagnostics = Some(DiagnosticsWorker::spawn(Arc::clone(&self.published), interval)?);
        }
        Ok(())
    }

    /// Plan a newly appeared vehicle through the merge and publish the result.
    ///
    /// A vehicle that cannot be planned is withdrawn from the simulation.
    ///
    /// # Errors
    ///
    /// Returns why the vehicle was rejected; the published schedule is
    /// unchanged in that case.
    pub fn admit<S: Simulation + ?Sized>(
        &self,
        simulation: &mut S,
        vehicle: &VehicleId,
    ) -> Result<AdmissionOutcome, ScheduleError> {
        #[cfg(feature = "perf_timing")]
        let started = std::time::Instant::now();

        let mut state = lock_or_recover(&self.state);

        let stream = self
            .config
            .classify(vehicle)
            .ok_or_else(|| ScheduleError::UnknownStream(vehicle.clone()))?;
        if state.trajectories.contains_key(vehicle) {
            return Err(ScheduleError::AlreadyAdmitted(vehicle.clone()));
        }

        let vehicle_state = simulation.vehicle_state(vehicle)?;
        if vehicle_state.lane_id.is_empty() {
            withdraw(simulation, vehicle);
            return Err(ScheduleError::NotOnLane(vehicle.clone()));
        }

        let cached = state.chains.get(&stream).cloned();
        let chain = match cached {
            Some(chain) => chain,
            None => match resolve_lane_chain(simulation, vehicle) {
                Ok(chain) => {
                    let chain = Arc::new(chain);
                    state.chains.insert(stream, Arc::clone(&chain));
                    chain
                }
                Err(error) => {
                    log::warn!("Withdrawing {vehicle}: {error}");
                    withdraw(simulation, vehicle);
                    let reason = match error {
                        PlanError::TopologyUnavailable { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    return Err(ScheduleError::TopologyUnavailable {
                        vehicle: vehicle.clone(),
                        reason,
                    });
                }
            },
        };

        let params = simulation.vehicle_params(vehicle)?;
        let scheduled = ScheduledVehicle {
            stream,
            plan: VehiclePlan {
                frame: TrajectoryFrame {
                    vehicle_id: vehicle.clone(),
                    lane_chain: chain,
                    head_offset: params.length + self.config.head_clearance,
                    safety_margin: params.length + self.config.safety_gap,
                    step: simulation.step_length(),
                },
                params,
                max_steps: self.config.max_plan_steps,
            },
        };
        let now = simulation.time();
        let start = StartState {
            time: now,
            position: vehicle_state.distance,
            speed: vehicle_state.speed,
        };
        let merge_offset = self.config.merge_offset(stream);

        // Pre-merge leg behind the previous vehicle of the same stream
        let pre = match state.stream_leader(stream) {
            None => plan_mono(&scheduled.plan, start, merge_offset),
            Some(leader) => plan_follow(&scheduled.plan, start, merge_offset, &LeaderView::new(&leader, 0.0)),
        };
        let pre = match pre {
            Ok(pre) => pre,
            Err(error) => {
                log::warn!("Withdrawing {vehicle}: pre-merge plan failed: {error}");
                withdraw(simulation, vehicle);
                return Err(error.into());
            }
        };

        let merged = match merge::plan_merge(&self.config, &state, &scheduled, &pre, now) {
            Ok(merged) => merged,
            Err(error) => {
                log::warn!("Withdrawing {vehicle}: {error}");
                withdraw(simulation, vehicle);
                return Err(error);
            }
        };

        state.commitments = merged.commitments;
        for (id, trajectory) in merged.updates {
            state.trajectories.insert(id, Arc::new(trajectory));
        }
        state.vehicles.insert(vehicle.clone(), scheduled);
        for id in &merged.withdrawn {
            state.forget(id);
            withdraw(simulation, id);
        }
        state.record_admission(
            stream,
            AdmissionRecord {
                vehicle_id: vehicle.clone(),
                time: now,
                speed: vehicle_state.speed,
                position: vehicle_state.distance,
            },
        );
        self.publish(&state);
        drop(state);

        log!(
            "Admitted {} ({}): commits at {:.1}s, {} cascaded, {} withdrawn",
            vehicle,
            stream,
            merged.commitment.time,
            merged.cascaded.len(),
            merged.withdrawn.len()
        );

        #[cfg(feature = "perf_timing")]
        #[allow(clippy::cast_precision_loss)]
        {
            use std::sync::atomic::Ordering;
            let elapsed = started.elapsed();
            timing::add_duration(&timing::ADMISSION_TIME, elapsed);
            timing::ADMISSIONS.fetch_add(1, Ordering::Relaxed);
            timing::CASCADED.fetch_add(merged.cascaded.len() as u64, Ordering::Relaxed);
            log!(
                "admit {}: {:.2}ms, {} cascaded (running total {:.1}ms over {} admissions, {} cascaded)",
                vehicle,
                elapsed.as_secs_f64() * 1000.0,
                merged.cascaded.len(),
                timing::ADMISSION_TIME.load(Ordering::Relaxed) as f64 / 1e6,
                timing::ADMISSIONS.load(Ordering::Relaxed),
                timing::CASCADED.load(Ordering::Relaxed)
            );
        }

        Ok(AdmissionOutcome {
            vehicle_id: vehicle.clone(),
            stream,
            commitment: merged.commitment,
            cascaded: merged.cascaded,
            withdrawn: merged.withdrawn,
            retries: merged.retries,
        })
    }

    fn publish(&self, state: &SchedulerState) {
        self.published.store(Arc::new(ScheduleSnapshot {
            trajectories: state.trajectories.clone(),
            commitments: state.commitments.clone(),
        }));
    }

    /// Lane and lane offset the vehicle should occupy at `time`.
    ///
    /// `None` if the vehicle is unknown or its trajectory is exhausted.
    #[must_use]
    pub fn trajectory_for(&self, vehicle: &VehicleId, time: f64) -> Option<(LaneId, f64)> {
        let snapshot = self.published.load();
        snapshot
            .sample_at(vehicle, time)
            .map(|sample| (sample.lane_id.clone(), sample.lane_offset))
    }

    /// Scheduled sample at or after `time`
    #[must_use]
    pub fn scheduled_sample(&self, vehicle: &VehicleId, time: f64) -> Option<Sample> {
        self.published.load().sample_at(vehicle, time).cloned()
    }

    #[must_use]
    pub fn trajectory(&self, vehicle: &VehicleId) -> Option<Arc<Trajectory>> {
        self.published.load().trajectories.get(vehicle).cloned()
    }

    /// Drop a vehicle that has exited or been withdrawn.
    pub fn release(&self, vehicle: &VehicleId) -> bool {
        let mut state = lock_or_recover(&self.state);
        let removed = state.forget(vehicle);
        if removed {
            self.publish(&state);
        }
        removed
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<ScheduleSnapshot> {
        self.published.load_full()
    }

    #[must_use]
    pub fn commitments(&self) -> Vec<CommitmentRecord> {
        self.published.load().commitments.clone()
    }

    #[must_use]
    pub fn stream_admissions(&self, stream: Stream) -> Vec<AdmissionRecord> {
        lock_or_recover(&self.state)
            .admissions
            .get(&stream)
            .cloned()
            .unwrap_or_default()
    }

    /// Report computed now from the current snapshot
    #[must_use]
    pub fn check_consistency(&self) -> ConsistencyReport {
        ConsistencyReport::from_snapshot(&self.published.load())
    }

    /// Latest report of the background worker, if it is running
    #[must_use]
    pub fn latest_report(&self) -> Option<Arc<ConsistencyReport>> {
        lock_or_recover(&self.diagnostics)
            .as_ref()
            .and_then(DiagnosticsWorker::latest)
    }

    /// Stop background diagnostics. Idempotent.
    pub fn shutdown(&self) {
        let worker = lock_or_recover(&self.diagnostics).take();
        if let Some(mut worker) = worker {
            worker.stop();
            log!("Diagnostics worker stopped");
        }
    }
}

impl Drop for MergeScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
