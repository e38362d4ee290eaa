//! Read-only consistency checks over the published schedule.
//!
//! Reports are always computed from an immutable [`ScheduleSnapshot`], so a
//! trajectory being replaced mid-check is never observed half-written. The
//! optional background worker polls the latest snapshot on a fixed cadence.

use crate::models::{is_time_ordered, LaneId, Trajectory, VehicleId};
use crate::scheduler::ScheduleSnapshot;
use arc_swap::{ArcSwap, ArcSwapOption};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Largest tolerated spread between the shortest and longest time step
const STEP_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryReport {
    pub vehicle_id: VehicleId,
    pub samples: usize,
    pub time_strictly_increasing: bool,
    pub min_step: f64,
    pub max_step: f64,
    pub position_non_decreasing: bool,
    pub min_position: f64,
    pub max_position: f64,
    pub stray_lanes: Vec<LaneId>,
}

impl TrajectoryReport {
    #[must_use]
    pub fn analyze(trajectory: &Trajectory) -> Self {
        let mut min_step = f64::INFINITY;
        let mut max_step = f64::NEG_INFINITY;
        let mut time_strictly_increasing = true;
        let mut position_non_decreasing = true;
        for pair in trajectory.samples.windows(2) {
            let step = pair[1].time - pair[0].time;
            min_step = min_step.min(step);
            max_step = max_step.max(step);
            time_strictly_increasing &= step > 0.0;
            position_non_decreasing &= pair[1].position >= pair[0].position;
        }
        if trajectory.len() < 2 {
            min_step = 0.0;
            max_step = 0.0;
        }

        let (min_position, max_position) = trajectory
            .samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
                (lo.min(s.position), hi.max(s.position))
            });

        Self {
            vehicle_id: trajectory.vehicle_id().clone(),
            samples: trajectory.len(),
            time_strictly_increasing,
            min_step,
            max_step,
            position_non_decreasing,
            min_position,
            max_position,
            stray_lanes: trajectory.lanes_outside_chain(),
        }
    }

    /// Fixed step, strictly increasing time, no reversing, all lanes known
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.time_strictly_increasing
            && self.max_step - self.min_step <= STEP_TOLERANCE
            && self.position_non_decreasing
            && self.stray_lanes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyReport {
    pub vehicles: usize,
    pub commitments: usize,
    pub commitments_ordered: bool,
    /// Reports of the trajectories that failed a check
    pub anomalies: Vec<TrajectoryReport>,
}

impl ConsistencyReport {
    #[must_use]
    pub fn from_snapshot(snapshot: &ScheduleSnapshot) -> Self {
        let mut anomalies: Vec<TrajectoryReport> = snapshot
            .trajectories
            .values()
            .map(|trajectory| TrajectoryReport::analyze(trajectory))
            .filter(|report| !report.is_consistent())
            .collect();
        anomalies.sort_by(|a, b| a.vehicle_id.as_str().cmp(b.vehicle_id.as_str()));

        Self {
            vehicles: snapshot.trajectories.len(),
            commitments: snapshot.commitments.len(),
            commitments_ordered: is_time_ordered(&snapshot.commitments),
            anomalies,
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.commitments_ordered && self.anomalies.is_empty()
    }

    pub fn log_anomalies(&self) {
        if !self.commitments_ordered {
            log::error!("Commitment list is out of time order ({} records)", self.commitments);
        }
        for report in &self.anomalies {
            if !report.stray_lanes.is_empty() {
                log::error!(
                    "Topology inconsistency for {}: lanes {:?} are not in its lane chain",
                    report.vehicle_id,
                    report.stray_lanes
                );
            }
            if !report.time_strictly_increasing || report.max_step - report.min_step > STEP_TOLERANCE {
                log::warn!(
                    "{} has an irregular time grid (step {:.6}..{:.6})",
                    report.vehicle_id,
                    report.min_step,
                    report.max_step
                );
            }
            if !report.position_non_decreasing {
                log::warn!("{} reverses somewhere in its trajectory", report.vehicle_id);
            }
        }
    }
}

/// Background thread producing a [`ConsistencyReport`] every interval.
pub struct DiagnosticsWorker {
    stop: Option<Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
    latest: Arc<ArcSwapOption<ConsistencyReport>>,
}

impl DiagnosticsWorker {
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(snapshot: Arc<ArcSwap<ScheduleSnapshot>>, interval: Duration) -> io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let latest = Arc::new(ArcSwapOption::empty());
        let worker_latest = Arc::clone(&latest);

        let worker = thread::Builder::new()
            .name("merge-diagnostics".to_owned())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let report = ConsistencyReport::from_snapshot(&snapshot.load());
                        report.log_anomalies();
                        worker_latest.store(Some(Arc::new(report)));
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            worker: Some(worker),
            latest,
        })
    }

    /// Most recent report, if the worker has completed a pass
    #[must_use]
    pub fn latest(&self) -> Option<Arc<ConsistencyReport>> {
        self.latest.load_full()
    }

    /// Signal the worker and wait for it to exit. Idempotent.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            // A full channel or a finished worker both mean it is stopping already
            let _ = stop.try_send(());
        }
        if let Some(worker) = self.worker.take() {
            if let Err(error) = worker.join() {
                log::warn!("Diagnostics worker panicked during shutdown: {error:?}");
            }
        }
    }
}

impl Drop for DiagnosticsWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
