//! Trajectory planners.
//!
//! Both planners integrate a point-mass vehicle at the simulation step and
//! hand the raw profile to [`crate::resample::rescale_to_position`] so the
//! last sample lands exactly on the requested end offset. They never touch
//! scheduler state: leaders are passed in read-only.

mod follow;
mod mono;

pub use follow::{extend_follow, plan_follow, LeaderView};
pub use mono::{extend_mono, plan_mono};

use crate::error::PlanError;
use crate::models::{Profile, Trajectory, TrajectoryFrame};
use crate::resample::rescale_to_position;
use crate::simulation::VehicleParams;

/// Kinematic state a plan starts from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartState {
    pub time: f64,
    pub position: f64,
    pub speed: f64,
}

/// Everything a planner needs to know about the vehicle being planned
#[derive(Debug, Clone)]
pub struct VehiclePlan {
    pub frame: TrajectoryFrame,
    pub params: VehicleParams,
    /// Integration steps allowed per planner call
    pub max_steps: usize,
}

impl VehiclePlan {
    /// Lane speed limit at `position`, capped by the vehicle's top speed
    fn speed_cap(&self, position: f64) -> f64 {
        self.params
            .max_speed
            .min(self.frame.lane_chain.speed_limit_at(position))
    }

    /// Speed change of one step at the given gain
    fn speed_delta(&self, gain: f64) -> f64 {
        self.frame.step * self.params.limiting_acceleration() * gain
    }

    /// Position the raw integration is allowed to run to
    fn target(&self, end: Option<f64>) -> f64 {
        let total = self.frame.lane_chain.total_length();
        end.map_or(total, |end| end.min(total))
    }

    fn check_budget(&self, steps: usize) -> Result<(), PlanError> {
        if steps > self.max_steps {
            return Err(PlanError::StepBudgetExceeded {
                vehicle: self.frame.vehicle_id.clone(),
                steps: self.max_steps,
            });
        }
        Ok(())
    }

    /// Rescale the raw profile so it ends exactly at `end` and attach lanes.
    fn finish(&self, mut profile: Profile, end: f64) -> Result<Trajectory, PlanError> {
        match profile.len() {
            0 => {
                return Err(PlanError::EmptyLeg {
                    vehicle: self.frame.vehicle_id.clone(),
                })
            }
            1 => profile.positions[0] = end,
            len => {
                let rescaled = rescale_to_position(
                    &profile.times,
                    &profile.positions,
                    &profile.speeds,
                    profile.positions[0],
                    profile.positions[len - 1],
                    end,
                )?;
                profile.positions = rescaled.positions;
                profile.speeds = rescaled.speeds;
            }
        }
        Ok(Trajectory::from_profile(self.frame.clone(), &profile))
    }
}
