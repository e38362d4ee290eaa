use super::{StartState, VehiclePlan};
use crate::constants::{FREE_GAIN, SPEED_LOWER_BAND, SPEED_UPPER_BAND};
use crate::error::PlanError;
use crate::models::{Profile, Trajectory};

/// One step of free driving toward the local speed cap
fn free_speed(plan: &VehiclePlan, position: f64, speed: f64) -> f64 {
    let cap = plan.speed_cap(position);
    let mut speed = speed;
    if speed < cap * SPEED_LOWER_BAND {
        speed += plan.speed_delta(FREE_GAIN);
    }
    if speed > cap * SPEED_UPPER_BAND {
        speed -= plan.speed_delta(FREE_GAIN);
    }
    speed.max(0.0)
}

/// Unconstrained trajectory from `start` to `end`, both samples included.
///
/// # Errors
///
/// Returns `EmptyLeg` if the vehicle already stands at or past `end`, and
/// `StepBudgetExceeded` if it cannot get there within the step budget.
pub fn plan_mono(plan: &VehiclePlan, start: StartState, end: f64) -> Result<Trajectory, PlanError> {
    let target = plan.target(Some(end));
    if start.position >= target {
        return Err(PlanError::EmptyLeg {
            vehicle: plan.frame.vehicle_id.clone(),
        });
    }

    let step = plan.frame.step;
    let mut profile = Profile::default();
    profile.push(start.time, start.position, start.speed);

    let (mut time, mut position, mut speed) = (start.time, start.position, start.speed);
    let mut steps = 0;
    while position < target {
        steps += 1;
        plan.check_budget(steps)?;
        speed = free_speed(plan, position, speed);
        position += speed * step;
        time += step;
        profile.push(time, position, speed);
    }

    plan.finish(profile, target)
}

/// Continue `trajectory` unconstrained to the end of the lane chain.
///
/// The extension starts one step after the last sample and is not rescaled.
///
/// # Errors
///
/// Returns `StepBudgetExceeded` if the route end is out of reach.
pub fn extend_mono(plan: &VehiclePlan, trajectory: &Trajectory) -> Result<Trajectory, PlanError> {
    let Some(last) = trajectory.last() else {
        return Err(PlanError::EmptyLeg {
            vehicle: plan.frame.vehicle_id.clone(),
        });
    };
    let total = plan.frame.lane_chain.total_length();
    let step = plan.frame.step;

    let mut tail = Profile::default();
    let (mut time, mut position, mut speed) = (last.time, last.position, last.speed);
    let mut steps = 0;
    while position < total {
        steps += 1;
        plan.check_budget(steps)?;
        speed = free_speed(plan, position, speed);
        position += speed * step;
        time += step;
        tail.push(time, position, speed);
    }

    if tail.is_empty() {
        return Ok(trajectory.clone());
    }
    Ok(trajectory.concatenate(&Trajectory::from_profile(plan.frame.clone(), &tail)))
}
