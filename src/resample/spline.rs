use crate::error::PlanError;

/// Piecewise cubic interpolant in Hermite form.
///
/// Piece `i` on `[x_i, x_i + h_i]` is
/// `y_i + m_i t + c_i t^2 + d_i t^3`; the slopes `m_i` come from a
/// tridiagonal solve, `c_i`/`d_i` follow from continuity unless overridden.
#[derive(Debug, Clone, PartialEq)]
pub struct CubicSpline {
    knots: Vec<f64>,
    values: Vec<f64>,
    slopes: Vec<f64>,
    quadratic: Vec<f64>,
    cubic: Vec<f64>,
}

impl CubicSpline {
    /// Spline with prescribed first derivatives at both ends.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBoundary` for fewer than two knots, mismatched
    /// lengths or knots that are not strictly increasing.
    pub fn clamped(knots: &[f64], values: &[f64], start_slope: f64, end_slope: f64) -> Result<Self, PlanError> {
        let n = knots.len();
        if n < 2 || values.len() != n {
            return Err(invalid(knots));
        }
        if knots.windows(2).any(|pair| pair[1] - pair[0] <= 0.0) {
            return Err(invalid(knots));
        }

        let widths: Vec<f64> = knots.windows(2).map(|pair| pair[1] - pair[0]).collect();
        let secants: Vec<f64> = values
            .windows(2)
            .zip(&widths)
            .map(|(pair, h)| (pair[1] - pair[0]) / h)
            .collect();

        let mut slopes = vec![0.0; n];
        slopes[0] = start_slope;
        slopes[n - 1] = end_slope;

        let interior = n - 2;
        if interior > 0 {
            // h_i m_{i-1} + 2(h_{i-1} + h_i) m_i + h_{i-1} m_{i+1} = 3(h_i d_{i-1} + h_{i-1} d_i)
            let mut lower = vec![0.0; interior];
            let mut diagonal = vec![0.0; interior];
            let mut upper = vec![0.0; interior];
            let mut rhs = vec![0.0; interior];
            for row in 0..interior {
                let i = row + 1;
                let (h_prev, h_next) = (widths[i - 1], widths[i]);
                lower[row] = h_next;
                diagonal[row] = 2.0 * (h_prev + h_next);
                upper[row] = h_prev;
                rhs[row] = 3.0 * (h_next * secants[i - 1] + h_prev * secants[i]);
            }
            rhs[0] -= lower[0] * start_slope;
            rhs[interior - 1] -= upper[interior - 1] * end_slope;

            let solved = solve_tridiagonal(&lower, &diagonal, &upper, &rhs);
            slopes[1..=interior].copy_from_slice(&solved);
        }

        let mut spline = Self {
            knots: knots.to_vec(),
            values: values.to_vec(),
            slopes,
            quadratic: vec![0.0; n - 1],
            cubic: vec![0.0; n - 1],
        };
        for piece in 0..n - 1 {
            let (c, d) = spline.hermite_coefficients(piece, &widths, &secants);
            spline.quadratic[piece] = c;
            spline.cubic[piece] = d;
        }
        Ok(spline)
    }

    fn hermite_coefficients(&self, piece: usize, widths: &[f64], secants: &[f64]) -> (f64, f64) {
        let h = widths[piece];
        let delta = secants[piece];
        let (m0, m1) = (self.slopes[piece], self.slopes[piece + 1]);
        let c = (3.0 * delta - 2.0 * m0 - m1) / h;
        let d = (m0 + m1 - 2.0 * delta) / (h * h);
        (c, d)
    }

    #[must_use]
    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn slopes(&self) -> &[f64] {
        &self.slopes
    }

    #[must_use]
    pub fn piece_count(&self) -> usize {
        self.quadratic.len()
    }

    #[must_use]
    pub fn piece_width(&self, piece: usize) -> f64 {
        self.knots[piece + 1] - self.knots[piece]
    }

    /// `(c, d)` coefficients of one piece
    #[must_use]
    pub fn coefficients(&self, piece: usize) -> (f64, f64) {
        (self.quadratic[piece], self.cubic[piece])
    }

    pub fn set_coefficients(&mut self, piece: usize, quadratic: f64, cubic: f64) {
        self.quadratic[piece] = quadratic;
        self.cubic[piece] = cubic;
    }

    fn locate(&self, x: f64) -> (usize, f64) {
        let piece = self
            .knots
            .partition_point(|knot| *knot <= x)
            .saturating_sub(1)
            .min(self.piece_count() - 1);
        (piece, x - self.knots[piece])
    }

    #[must_use]
    pub fn evaluate(&self, x: f64) -> f64 {
        let (i, t) = self.locate(x);
        self.values[i] + t * (self.slopes[i] + t * (self.quadratic[i] + t * self.cubic[i]))
    }

    #[must_use]
    pub fn derivative(&self, x: f64) -> f64 {
        let (i, t) = self.locate(x);
        self.slopes[i] + t * (2.0 * self.quadratic[i] + 3.0 * t * self.cubic[i])
    }

    #[must_use]
    pub fn second_derivative(&self, x: f64) -> f64 {
        let (i, t) = self.locate(x);
        2.0 * self.quadratic[i] + 6.0 * t * self.cubic[i]
    }
}

fn invalid(knots: &[f64]) -> PlanError {
    PlanError::InvalidBoundary {
        start: knots.first().copied().unwrap_or(f64::NAN),
        end: knots.last().copied().unwrap_or(f64::NAN),
    }
}

/// Thomas algorithm; the system is diagonally dominant so no pivoting.
fn solve_tridiagonal(lower: &[f64], diagonal: &[f64], upper: &[f64], rhs: &[f64]) -> Vec<f64> {
    let n = diagonal.len();
    let mut upper_prime = vec![0.0; n];
    let mut rhs_prime = vec![0.0; n];

    upper_prime[0] = upper[0] / diagonal[0];
    rhs_prime[0] = rhs[0] / diagonal[0];
    for i in 1..n {
        let denominator = diagonal[i] - lower[i] * upper_prime[i - 1];
        upper_prime[i] = upper[i] / denominator;
        rhs_prime[i] = (rhs[i] - lower[i] * rhs_prime[i - 1]) / denominator;
    }

    let mut solution = vec![0.0; n];
    solution[n - 1] = rhs_prime[n - 1];
    for i in (0..n - 1).rev() {
        solution[i] = rhs_prime[i] - upper_prime[i] * solution[i + 1];
    }
    solution
}
