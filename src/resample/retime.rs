use super::spline::CubicSpline;
use crate::constants::TIME_EPSILON;
use crate::error::PlanError;
use crate::models::{Profile, Trajectory};

/// Resample `trajectory` onto a grid of the same step that starts at its
/// first sample and ends at `new_end_time`.
///
/// The motion is stretched (or compressed) in time: grid times map linearly
/// onto the original time span and positions are read off a spline through
/// the original samples. Speeds are recomputed as discrete differences,
/// except the first, which keeps the original initial speed so the
/// trajectory still joins whatever precedes it. Both end positions are kept.
///
/// # Errors
///
/// Returns `InvalidBoundary` if the trajectory is empty or `new_end_time`
/// lies before its first sample.
pub fn retime_to_duration(trajectory: &Trajectory, new_end_time: f64) -> Result<Trajectory, PlanError> {
    let (Some(first), Some(last)) = (trajectory.first(), trajectory.last()) else {
        return Err(PlanError::InvalidBoundary {
            start: f64::NAN,
            end: new_end_time,
        });
    };
    let start_time = first.time;
    if new_end_time < start_time - TIME_EPSILON {
        return Err(PlanError::InvalidBoundary {
            start: start_time,
            end: new_end_time,
        });
    }

    let step = trajectory.frame.step;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let intervals = ((new_end_time - start_time) / step + TIME_EPSILON).floor().max(0.0) as usize;
    #[allow(clippy::cast_precision_loss)]
    let grid: Vec<f64> = (0..=intervals).map(|i| start_time + i as f64 * step).collect();

    let old_span = last.time - start_time;
    let new_span = grid[grid.len() - 1] - start_time;

    let positions: Vec<f64> = if trajectory.len() < 2 || new_span <= 0.0 {
        vec![first.position; grid.len()]
    } else {
        let profile = trajectory.profile();
        let spline = CubicSpline::clamped(&profile.times, &profile.positions, first.speed, last.speed)?;
        let mut running = f64::NEG_INFINITY;
        grid.iter()
            .map(|&t| {
                let mapped = start_time + (t - start_time) * old_span / new_span;
                running = running.max(spline.evaluate(mapped));
                running
            })
            .collect()
    };

    let mut positions = positions;
    positions[0] = first.position;
    if grid.len() > 1 {
        let end = positions.len() - 1;
        positions[end] = last.position;
    }

    let mut retimed = Profile::with_capacity(grid.len());
    for (i, (&time, &position)) in grid.iter().zip(&positions).enumerate() {
        let speed = if i == 0 {
            first.speed
        } else {
            ((position - positions[i - 1]) / step).max(0.0)
        };
        retimed.push(time, position, speed);
    }
    Ok(Trajectory::from_profile(trajectory.frame.clone(), &retimed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LaneChain, LaneSegment, TrajectoryFrame, VehicleId};
    use std::sync::Arc;

    fn trajectory(samples: &[(f64, f64, f64)], step: f64) -> Trajectory {
        let frame = TrajectoryFrame {
            vehicle_id: VehicleId::from("r.0"),
            lane_chain: Arc::new(LaneChain::new(vec![
                LaneSegment::new("E1_0", 955.0, 16.67),
                LaneSegment::new("E2_0", 300.0, 20.0),
            ])),
            head_offset: 5.1,
            safety_margin: 8.0,
            step,
        };
        let mut profile = Profile::default();
        for &(t, x, v) in samples {
            profile.push(t, x, v);
        }
        Trajectory::from_profile(frame, &profile)
    }

    fn constant_speed(start: f64, count: usize, speed: f64, step: f64) -> Trajectory {
        #[allow(clippy::cast_precision_loss)]
        let samples: Vec<(f64, f64, f64)> = (0..count)
            .map(|i| (start + i as f64 * step, speed * i as f64 * step, speed))
            .collect();
        trajectory(&samples, step)
    }

    #[test]
    fn test_stretch_keeps_endpoints_and_grid() {
        let original = constant_speed(4.0, 101, 10.0, 0.1); // 4.0 .. 14.0, 0 .. 100 m
        let stretched = retime_to_duration(&original, 24.0).expect("retime");

        assert_eq!(stretched.len(), 201);
        assert_eq!(stretched.first().expect("first").time, 4.0);
        assert!((stretched.last().expect("last").time - 24.0).abs() < 1e-9);
        assert_eq!(stretched.first().expect("first").position, 0.0);
        assert_eq!(stretched.last().expect("last").position, 100.0);
        assert_eq!(stretched.first().expect("first").speed, 10.0);
        // Twice the duration over the same distance halves the speed
        assert!((stretched.samples[100].speed - 5.0).abs() < 1e-6);

        for pair in stretched.samples.windows(2) {
            assert!((pair[1].time - pair[0].time - 0.1).abs() < 1e-9);
            assert!(pair[1].position >= pair[0].position);
        }
    }

    #[test]
    fn test_lanes_recomputed() {
        let original = constant_speed(0.0, 11, 100.0, 0.1); // reaches 100 m
        let retimed = retime_to_duration(&original, 1.0).expect("retime");
        for sample in &retimed.samples {
            assert_eq!(sample.lane_id.as_str(), "E1_0");
        }
        let last = retimed.last().expect("last");
        assert!((last.lane_offset - 105.1).abs() < 1e-9);
    }

    #[test]
    fn test_end_before_start_is_rejected() {
        let original = constant_speed(4.0, 5, 10.0, 0.1);
        assert!(matches!(
            retime_to_duration(&original, 3.0),
            Err(PlanError::InvalidBoundary { .. })
        ));
    }

    #[test]
    fn test_single_sample_holds_position() {
        let original = trajectory(&[(2.0, 40.0, 3.0)], 0.5);
        let retimed = retime_to_duration(&original, 3.0).expect("retime");
        assert_eq!(retimed.len(), 3);
        assert!(retimed.samples.iter().all(|s| s.position == 40.0));
        assert_eq!(retimed.samples[0].speed, 3.0);
        assert_eq!(retimed.samples[2].speed, 0.0);
    }
}
