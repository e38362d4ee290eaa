//! Per-tick realization of scheduled trajectories.
//!
//! Control is open-loop: every tick each live vehicle is placed on the lane
//! and offset its trajectory prescribes, and nothing the simulator reports
//! feeds back into the plan. Deviations are only measured and logged.

use crate::logging::log;
use crate::models::VehicleId;
use crate::scheduler::MergeScheduler;
use crate::simulation::Simulation;

/// Scheduled versus reported distance of one vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct Deviation {
    pub vehicle_id: VehicleId,
    pub time: f64,
    pub scheduled: f64,
    pub reported: f64,
}

impl Deviation {
    #[must_use]
    pub fn error(&self) -> f64 {
        self.scheduled - self.reported
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub moved: usize,
    /// Vehicles removed this tick: exhausted plans and vehicles never planned
    pub withdrawn: Vec<VehicleId>,
    pub deviations: Vec<Deviation>,
}

/// Whether the tick at `time` is one where deviations are measured
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn is_check_tick(time: f64, step: f64, every: u64) -> bool {
    if every == 0 || step <= 0.0 {
        return false;
    }
    let tick = (time / step).round().max(0.0) as u64;
    tick % every == 0
}

/// Move every live vehicle onto its scheduled lane position for the current
/// simulation time.
pub fn drive_tick<S: Simulation + ?Sized>(scheduler: &MergeScheduler, simulation: &mut S) -> TickReport {
    let now = simulation.time();
    let config = scheduler.config();
    let check = is_check_tick(now, simulation.step_length(), config.deviation_check_every);
    let snapshot = scheduler.snapshot();

    let mut report = TickReport::default();
    for vehicle in simulation.vehicle_ids() {
        let Some(sample) = snapshot.sample_at(&vehicle, now) else {
            if let Err(error) = simulation.remove_vehicle(&vehicle) {
                log::warn!("Failed to withdraw {vehicle}: {error}");
            }
            if scheduler.release(&vehicle) {
                log!("{} finished its trajectory at {:.1}s", vehicle, now);
            }
            report.withdrawn.push(vehicle);
            continue;
        };

        if check {
            match simulation.vehicle_state(&vehicle) {
                Ok(state) if (sample.position - state.distance).abs() > config.deviation_tolerance => {
                    let deviation = Deviation {
                        vehicle_id: vehicle.clone(),
                        time: now,
                        scheduled: sample.position,
                        reported: state.distance,
                    };
                    log::warn!(
                        "{} deviates by {:.2} m at {:.1}s (on {} at {:.2}, scheduled {} at {:.2})",
                        vehicle,
                        deviation.error(),
                        now,
                        state.lane_id,
                        state.lane_offset,
                        sample.lane_id,
                        sample.lane_offset
                    );
                    report.deviations.push(deviation);
                }
                Ok(_) => {}
                Err(error) => log::warn!("Cannot read state of {vehicle}: {error}"),
            }
        }

        match simulation.move_to(&vehicle, &sample.lane_id, sample.lane_offset) {
            Ok(()) => report.moved += 1,
            Err(error) => log::warn!("Failed to move {vehicle}: {error}"),
        }
    }
    report
}
