//! Merge insertion and cascade repair.
//!
//! Everything here is computed against a read-only view of the scheduler
//! state and returned as a [`MergePlan`]; the caller applies it in one go,
//! so a failure half-way never leaves the commitment list or the trajectory
//! map partially rewritten.

use super::state::{ScheduledVehicle, SchedulerState};
use crate::config::SchedulerConfig;
use crate::error::{PlanError, ScheduleError};
use crate::logging::log;
use crate::models::{CommitmentRecord, Trajectory, VehicleId};
use crate::planner::{extend_follow, extend_mono, LeaderView, StartState};
use crate::resample::retime_to_duration;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of inserting one vehicle, cascade included
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub commitment: CommitmentRecord,
    /// Full replacement commitment list
    pub commitments: Vec<CommitmentRecord>,
    pub updates: Vec<(VehicleId, Trajectory)>,
    pub cascaded: Vec<VehicleId>,
    /// Cascaded vehicles that could not be re-planned
    pub withdrawn: Vec<VehicleId>,
    pub retries: usize,
}

/// Where a vehicle ends up after following a committed leader
struct Placement {
    record: CommitmentRecord,
    trajectory: Trajectory,
    retries: usize,
}

struct MergeContext<'a> {
    config: &'a SchedulerConfig,
    state: &'a SchedulerState,
    // Trajectories re-planned during this merge shadow the stored ones
    overlay: HashMap<VehicleId, Arc<Trajectory>>,
}

impl MergeContext<'_> {
    fn trajectory(&self, vehicle: &VehicleId) -> Option<Arc<Trajectory>> {
        self.overlay
            .get(vehicle)
            .or_else(|| self.state.trajectories.get(vehicle))
            .cloned()
    }

    fn merge_offset_of(&self, vehicle: &VehicleId) -> Option<f64> {
        self.state
            .vehicles
            .get(vehicle)
            .map(|scheduled| scheduled.stream)
            .or_else(|| self.config.classify(vehicle))
            .map(|stream| self.config.merge_offset(stream))
    }

    /// Retime `leg` to successive entry times until a follow plan behind
    /// `leader` succeeds. `past` is prepended verbatim.
    fn follow_leader(
        &self,
        scheduled: &ScheduledVehicle,
        leg: &Trajectory,
        past: Option<&Trajectory>,
        leader: &CommitmentRecord,
    ) -> Result<Placement, ScheduleError> {
        let plan = &scheduled.plan;
        let vehicle = &plan.frame.vehicle_id;
        let own_offset = self.config.merge_offset(scheduled.stream);
        let Some(leg_end) = leg.last() else {
            return Err(PlanError::EmptyLeg { vehicle: vehicle.clone() }.into());
        };

        let join = |retimed: Trajectory| match past {
            Some(past) if !past.is_empty() => past.concatenate(&retimed),
            _ => retimed,
        };

        let Some(leader_trajectory) = self.trajectory(&leader.vehicle_id) else {
            // Leader already left the network: nothing to follow
            let pre = join(leg.clone());
            let record = commitment_at(&pre, vehicle)?;
            let trajectory = extend_mono(plan, &pre)?;
            return Ok(Placement {
                record,
                trajectory,
                retries: 0,
            });
        };

        let leader_offset = self.merge_offset_of(&leader.vehicle_id).unwrap_or(own_offset);
        let shift = own_offset - leader_offset;
        let view = LeaderView::new(&leader_trajectory, shift);

        let mut entry = leg_end.time.max(leader.time);
        if let Some(vacated) = leader_trajectory.time_past_position(leader_offset + plan.frame.safety_margin) {
            entry = entry.max(vacated);
        }

        for attempt in 0..self.config.max_entry_retries {
            #[allow(clippy::cast_precision_loss)]
            let entry_time = entry + attempt as f64 * self.config.entry_retry_increment;
            let pre = join(retime_to_duration(leg, entry_time)?);
            let record = commitment_at(&pre, vehicle)?;
            let start = StartState {
                time: record.time,
                position: record.position,
                speed: record.speed,
            };

            match extend_follow(plan, start, &view) {
                Ok(tail) => {
                    if attempt > 0 {
                        log!("{} enters behind {} after {} retries", vehicle, leader.vehicle_id, attempt);
                    }
                    return Ok(Placement {
                        record,
                        trajectory: pre.concatenate(&tail),
                        retries: attempt,
                    });
                }
                Err(PlanError::MergeInfeasible { .. }) => {}
                Err(error) => return Err(error.into()),
            }
        }

        Err(ScheduleError::MergeInfeasible {
            vehicle: vehicle.clone(),
            retries: self.config.max_entry_retries,
        })
    }

    /// Re-plan a vehicle whose commitment was invalidated, keeping the part
    /// of its trajectory that lies before `now`.
    fn repair(&self, vehicle: &VehicleId, leader: &CommitmentRecord, now: f64) -> Result<Placement, ScheduleError> {
        let (Some(scheduled), Some(current)) = (self.state.vehicles.get(vehicle), self.trajectory(vehicle)) else {
            return Err(PlanError::EmptyLeg { vehicle: vehicle.clone() }.into());
        };
        let own_offset = self.config.merge_offset(scheduled.stream);
        let pre_leg = current.truncate_before_position(own_offset);
        let (past, future) = pre_leg.split_at_time(now);
        if future.is_empty() {
            return Err(PlanError::EmptyLeg { vehicle: vehicle.clone() }.into());
        }
        self.follow_leader(scheduled, &future, Some(&past), leader)
    }
}

fn commitment_at(trajectory: &Trajectory, vehicle: &VehicleId) -> Result<CommitmentRecord, ScheduleError> {
    let last = trajectory
        .last()
        .ok_or_else(|| PlanError::EmptyLeg { vehicle: vehicle.clone() })?;
    Ok(CommitmentRecord {
        vehicle_id: vehicle.clone(),
        time: last.time,
        speed: last.speed,
        position: last.position,
    })
}

/// Insert `scheduled` with its pre-merge leg `pre` into the commitment order
/// and re-plan every vehicle it overtakes.
///
/// # Errors
///
/// Returns `MergeInfeasible` if the new vehicle cannot enter within the
/// retry budget; nothing is changed in that case.
pub fn plan_merge(
    config: &SchedulerConfig,
    state: &SchedulerState,
    scheduled: &ScheduledVehicle,
    pre: &Trajectory,
    now: f64,
) -> Result<MergePlan, ScheduleError> {
    let vehicle = scheduled.plan.frame.vehicle_id.clone();
    let try_enter = commitment_at(pre, &vehicle)?.time;

    let keep = state.commitments.partition_point(|record| record.time <= try_enter);
    let mut commitments = state.commitments[..keep].to_vec();
    let invalidated = state.commitments[keep..].to_vec();

    let mut context = MergeContext {
        config,
        state,
        overlay: HashMap::new(),
    };

    let placement = match commitments.last() {
        None => {
            let record = commitment_at(pre, &vehicle)?;
            let trajectory = extend_mono(&scheduled.plan, pre)?;
            Placement {
                record,
                trajectory,
                retries: 0,
            }
        }
        Some(leader) => context.follow_leader(scheduled, pre, None, leader)?,
    };

    let commitment = placement.record.clone();
    commitments.push(placement.record);
    context.overlay.insert(vehicle.clone(), Arc::new(placement.trajectory.clone()));
    let mut updates = vec![(vehicle.clone(), placement.trajectory)];

    let mut cascaded = Vec::new();
    let mut withdrawn = Vec::new();
    for record in invalidated {
        let Some(leader) = commitments.last().cloned() else {
            break;
        };
        match context.repair(&record.vehicle_id, &leader, now) {
            Ok(repaired) => {
                log!(
                    "Cascade: {} re-planned behind {} (commit {:.1}s -> {:.1}s)",
                    record.vehicle_id,
                    leader.vehicle_id,
                    record.time,
                    repaired.record.time
                );
                commitments.push(repaired.record);
                context
                    .overlay
                    .insert(record.vehicle_id.clone(), Arc::new(repaired.trajectory.clone()));
                updates.push((record.vehicle_id.clone(), repaired.trajectory));
                cascaded.push(record.vehicle_id);
            }
            Err(error) => {
                log::warn!("Cascade repair of {} failed, withdrawing it: {error}", record.vehicle_id);
                withdrawn.push(record.vehicle_id);
            }
        }
    }

    Ok(MergePlan {
        commitment,
        commitments,
        updates,
        cascaded,
        withdrawn,
        retries: placement.retries,
    })
}
