use super::{StartState, VehiclePlan};
use crate::constants::{
    ACCELERATION_ROOM, CLOSING_BAND, CLOSING_GAIN, CREEP_BAND, EMERGENCY_BAND, EMERGENCY_GAIN, ENTRY_ZONE,
    FREE_GAIN, MATCH_BAND, ORIGIN_ZONE, OVERLAP_GAIN, OVERLAP_SLACK, RECOVERY_LIMIT, SPEED_LOWER_BAND,
    SPEED_SLACK, SPEED_UPPER_BAND, STANDSTILL_NUDGE, STANDSTILL_START, STRICT_GAP_BAND, STRICT_SPEED_BAND,
};
use crate::error::PlanError;
use crate::models::{Profile, Trajectory};

/// A leader's scheduled trajectory seen from the follower's coordinates.
///
/// Vehicles of different streams measure position from different origins;
/// `shift` moves the leader's positions into the follower's frame.
#[derive(Debug, Clone, Copy)]
pub struct LeaderView<'a> {
    trajectory: &'a Trajectory,
    shift: f64,
}

impl<'a> LeaderView<'a> {
    #[must_use]
    pub fn new(trajectory: &'a Trajectory, shift: f64) -> Self {
        Self { trajectory, shift }
    }

    /// Leader `(position, speed)` at the first sample at or after `time`.
    ///
    /// `None` when the leader's plan has already run out; the follower is
    /// then unconstrained for that step.
    #[must_use]
    pub fn sample(&self, time: f64) -> Option<(f64, f64)> {
        self.trajectory
            .sample_at_or_after(time)
            .map(|sample| (sample.position + self.shift, sample.speed))
    }

    #[must_use]
    pub fn trajectory(&self) -> &Trajectory {
        self.trajectory
    }
}

/// Speed for the next step behind a leader at `(leader_x, leader_v)`.
fn constrained_speed(
    plan: &VehiclePlan,
    position: f64,
    speed: f64,
    leader: Option<(f64, f64)>,
    from_origin: bool,
) -> f64 {
    let cap = plan.speed_cap(position);
    let space = plan.frame.safety_margin;
    let mut v = speed;

    if v < cap * SPEED_LOWER_BAND {
        match leader {
            None => v += plan.speed_delta(FREE_GAIN),
            Some((lx, lv)) if position + space + ACCELERATION_ROOM < lx && v < lv => {
                v += plan.speed_delta(FREE_GAIN);
            }
            Some(_) => {}
        }
    }
    if v > cap * SPEED_UPPER_BAND {
        v -= plan.speed_delta(FREE_GAIN);
    }

    if let Some((lx, lv)) = leader {
        let front = position + space;
        let entering = position < space + ENTRY_ZONE;

        if front > lx {
            v -= plan.speed_delta(OVERLAP_GAIN);
            if v > lv {
                v -= plan.speed_delta(CLOSING_GAIN);
            }
        }
        if front > lx - CREEP_BAND && entering {
            v = lv;
        }
        if v > lv && position < ENTRY_ZONE {
            v = lv;
        }
        if v > lv + SPEED_SLACK && front > lx - MATCH_BAND {
            v = lv;
        }
        if from_origin && v > lv && front > lx - CLOSING_BAND && position > RECOVERY_LIMIT {
            v -= plan.speed_delta(CLOSING_GAIN);
        }
        // Hard stop: contact inside the space the vehicles ahead still occupy
        if front > lx && entering {
            v = 0.0;
        }
        if from_origin && front > lx - EMERGENCY_BAND && position > RECOVERY_LIMIT {
            v -= plan.speed_delta(EMERGENCY_GAIN);
        }
    }

    v.max(0.0)
}

/// Append the samples after `start` behind `leader` until `target` is
/// reached.
///
/// Once the gap to the leader settles just outside the safety margin with
/// matching speeds, it is latched and the follower mirrors the leader at
/// that gap for the rest of the run. A locked follower stays behind the
/// leader at every sample time, so only unlocked steps are checked for
/// overlap.
fn integrate_follow(
    plan: &VehiclePlan,
    start: StartState,
    target: f64,
    leader: &LeaderView<'_>,
    profile: &mut Profile,
) -> Result<(), PlanError> {
    let step = plan.frame.step;
    let space = plan.frame.safety_margin;

    let start_position = if start.position < STANDSTILL_START {
        STANDSTILL_NUDGE
    } else {
        start.position
    };
    let from_origin = start_position < ORIGIN_ZONE;

    let (mut time, mut position, mut speed) = (start.time, start_position, start.speed);
    let mut strict_gap: Option<f64> = None;
    let mut steps = 0;

    while position < target {
        steps += 1;
        plan.check_budget(steps)?;

        let sample = leader.sample(time);
        speed = constrained_speed(plan, position, speed, sample, from_origin);

        if let (None, Some((lx, lv))) = (strict_gap, sample) {
            let gap_error = position + space - lx;
            if -STRICT_GAP_BAND < gap_error && gap_error < 0.0 && (speed - lv).abs() < STRICT_SPEED_BAND {
                strict_gap = Some(lx - position);
            }
        }

        // Locked: same gap to the leader's next sample, never recaptured
        let locked = strict_gap.and_then(|gap| leader.sample(time + step).map(|(nx, nv)| (nx - gap, nv)));
        match locked {
            Some((locked_position, leader_speed)) => {
                position = locked_position;
                speed = leader_speed;
            }
            None => {
                position += speed * step;
                if let Some((lx, _)) = sample {
                    if position + space > lx + OVERLAP_SLACK && position > RECOVERY_LIMIT {
                        return Err(PlanError::MergeInfeasible {
                            vehicle: plan.frame.vehicle_id.clone(),
                            time,
                        });
                    }
                }
            }
        }

        time += step;
        profile.push(time, position, speed);
    }
    Ok(())
}

/// Pre-merge leg behind `leader` from `start` to `end`, both samples
/// included.
///
/// # Errors
///
/// Returns `MergeInfeasible` as soon as the safety margin is violated past
/// the point a hard stop could recover it, `EmptyLeg` if the vehicle already
/// stands at or past `end`, and `StepBudgetExceeded` if `end` is out of
/// reach.
pub fn plan_follow(
    plan: &VehiclePlan,
    start: StartState,
    end: f64,
    leader: &LeaderView<'_>,
) -> Result<Trajectory, PlanError> {
    let target = plan.target(Some(end));
    if start.position >= target {
        return Err(PlanError::EmptyLeg {
            vehicle: plan.frame.vehicle_id.clone(),
        });
    }

    let mut profile = Profile::default();
    profile.push(start.time, start.position, start.speed);
    integrate_follow(plan, start, target, leader, &mut profile)?;
    plan.finish(profile, target)
}

/// Merged tail behind `leader`, from one step after `start` to the end of
/// the lane chain.
///
/// The tail ends wherever the integration stops; it is only smoothed, not
/// stretched.
///
/// # Errors
///
/// Same as [`plan_follow`]; `EmptyLeg` when `start` is already at the
/// route end.
pub fn extend_follow(plan: &VehiclePlan, start: StartState, leader: &LeaderView<'_>) -> Result<Trajectory, PlanError> {
    let mut profile = Profile::default();
    integrate_follow(plan, start, plan.target(None), leader, &mut profile)?;
    let end = profile.positions.last().copied().unwrap_or(start.position);
    plan.finish(profile, end)
}
