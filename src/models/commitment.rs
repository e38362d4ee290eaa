use super::VehicleId;
use serde::{Deserialize, Serialize};

/// A vehicle's state at the instant its trajectory crosses the merge offset.
///
/// The ordered list of these records decides which vehicle enters the
/// shared segment first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitmentRecord {
    pub vehicle_id: VehicleId,
    pub time: f64,
    pub speed: f64,
    pub position: f64,
}

/// Whether `records` is ordered by commitment time
#[must_use]
pub fn is_time_ordered(records: &[CommitmentRecord]) -> bool {
    records.windows(2).all(|pair| pair[0].time <= pair[1].time)
}
