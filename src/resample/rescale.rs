use super::spline::CubicSpline;
use crate::error::PlanError;

/// Positions and speeds after a rescale, aligned with the input times
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rescaled {
    pub positions: Vec<f64>,
    pub speeds: Vec<f64>,
}

/// Stretch a position series so it runs from `old_start` to `new_end`.
///
/// The series is scaled linearly, then refitted with a spline whose end
/// slopes match the scaled series and whose boundary pieces are adjusted
/// towards the series' boundary curvature. The result is renormalized into
/// `[old_start, new_end]`, forced non-decreasing and clamped at zero; both
/// endpoints are exact.
///
/// Speeds are the input speeds scaled by the same factor as the positions,
/// except on the two refitted boundary pieces, where they are read off the
/// spline.
///
/// # Errors
///
/// Returns `InvalidBoundary` when `new_end < old_start`, when the time
/// series is not strictly increasing, when the series lengths differ, or
/// when a single sample cannot hit both boundaries.
pub fn rescale_to_position(
    times: &[f64],
    positions: &[f64],
    speeds: &[f64],
    old_start: f64,
    old_end: f64,
    new_end: f64,
) -> Result<Rescaled, PlanError> {
    let boundary_error = PlanError::InvalidBoundary {
        start: old_start,
        end: new_end,
    };
    let n = positions.len();
    if n != times.len() || n != speeds.len() || new_end < old_start {
        return Err(boundary_error);
    }
    match n {
        0 => return Ok(Rescaled::default()),
        1 if (old_start - new_end).abs() <= f64::EPSILON => {
            return Ok(Rescaled {
                positions: vec![old_start.max(0.0)],
                speeds: vec![0.0],
            });
        }
        1 => return Err(boundary_error),
        _ => {}
    }
    if times.windows(2).any(|pair| pair[1] <= pair[0]) {
        return Err(boundary_error);
    }

    if (old_end - old_start).abs() <= f64::EPSILON {
        return Ok(linear_ramp(times, old_start, new_end));
    }

    let factor = (new_end - old_start) / (old_end - old_start);
    let scaled: Vec<f64> = positions
        .iter()
        .map(|x| old_start + (x - old_start) * factor)
        .collect();

    let (start_slope, end_slope) = boundary_slopes(times, &scaled);
    let (start_curvature, end_curvature) = boundary_curvatures(times, &scaled);
    let mut spline = CubicSpline::clamped(times, &scaled, start_slope, end_slope)?;
    let last_piece = spline.piece_count() - 1;
    fit_boundary_piece(&mut spline, 0, start_curvature, true);
    fit_boundary_piece(&mut spline, last_piece, end_curvature, false);

    let fitted: Vec<f64> = times.iter().map(|&t| spline.evaluate(t)).collect();
    let lowest = fitted.iter().copied().fold(f64::INFINITY, f64::min);
    let highest = fitted.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if highest - lowest <= f64::EPSILON {
        return Ok(linear_ramp(times, old_start, new_end));
    }

    let normalize = (new_end - old_start) / (highest - lowest);
    let mut out_positions = Vec::with_capacity(n);
    let mut running = f64::NEG_INFINITY;
    for value in &fitted {
        let position = (old_start + (value - lowest) * normalize).max(0.0);
        running = running.max(position);
        out_positions.push(running);
    }
    out_positions[0] = old_start.max(0.0);
    out_positions[n - 1] = new_end.max(0.0);

    // Samples 0..=1 and n-2..n lie on the refitted pieces
    let out_speeds = times
        .iter()
        .zip(speeds)
        .enumerate()
        .map(|(i, (&t, &speed))| {
            if i <= 1 || i + 2 >= n {
                spline.derivative(t) * normalize
            } else {
                speed * factor
            }
        })
        .map(|speed| speed.max(0.0))
        .collect();

    Ok(Rescaled {
        positions: out_positions,
        speeds: out_speeds,
    })
}

fn linear_ramp(times: &[f64], start: f64, end: f64) -> Rescaled {
    let (t0, t1) = (times[0], times[times.len() - 1]);
    let span = t1 - t0;
    let speed = if span > 0.0 { (end - start) / span } else { 0.0 };
    let mut positions: Vec<f64> = times
        .iter()
        .map(|t| (start + (t - t0) * speed).max(0.0))
        .collect();
    if let Some(last) = positions.last_mut() {
        *last = end.max(0.0);
    }
    Rescaled {
        positions,
        speeds: vec![speed.max(0.0); times.len()],
    }
}

fn boundary_slopes(times: &[f64], values: &[f64]) -> (f64, f64) {
    let n = values.len();
    let start = (values[1] - values[0]) / (times[1] - times[0]);
    let end = (values[n - 1] - values[n - 2]) / (times[n - 1] - times[n - 2]);
    (start, end)
}

fn boundary_curvatures(times: &[f64], values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n < 3 {
        return (0.0, 0.0);
    }
    let second = |i: usize| {
        let left = (values[i + 1] - values[i]) / (times[i + 1] - times[i]);
        let right = (values[i + 2] - values[i + 1]) / (times[i + 2] - times[i + 1]);
        2.0 * (right - left) / (times[i + 2] - times[i])
    };
    (second(0), second(n - 3))
}

/// Least-squares refit of one boundary piece's `(c, d)` coefficients.
///
/// Residuals, all in acceleration units: the second derivative at the
/// outer end against `curvature`, and the value and slope mismatch at the
/// inner knot. The 2x2 normal equations are solved directly.
fn fit_boundary_piece(spline: &mut CubicSpline, piece: usize, curvature: f64, at_start: bool) {
    let h = spline.piece_width(piece);
    let y0 = spline.values()[piece];
    let y1 = spline.values()[piece + 1];
    let m0 = spline.slopes()[piece];
    let m1 = spline.slopes()[piece + 1];

    // Rows of A (unknowns c, d) and targets b
    let curvature_row = if at_start { [2.0, 0.0] } else { [2.0, 6.0 * h] };
    let rows = [
        (curvature_row, curvature),
        ([1.0, h], (y1 - y0 - m0 * h) / (h * h)),
        ([2.0, 3.0 * h], (m1 - m0) / h),
    ];

    let (mut a11, mut a12, mut a22, mut b1, mut b2) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for ([r1, r2], target) in rows {
        a11 += r1 * r1;
        a12 += r1 * r2;
        a22 += r2 * r2;
        b1 += r1 * target;
        b2 += r2 * target;
    }
    let determinant = a11 * a22 - a12 * a12;
    if determinant.abs() <= f64::EPSILON {
        return;
    }
    let c = (b1 * a22 - b2 * a12) / determinant;
    let d = (a11 * b2 - a12 * b1) / determinant;
    if c.is_finite() && d.is_finite() {
        spline.set_coefficients(piece, c, d);
    }
}
