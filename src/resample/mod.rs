//! Trajectory resampling: rescale a position series to a new end position,
//! or retime a trajectory to a new end time. Both are pure.

mod rescale;
mod retime;
mod spline;

pub use rescale::{rescale_to_position, Rescaled};
pub use retime::retime_to_duration;
pub use spline::CubicSpline;
