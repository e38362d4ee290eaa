//! Tuning constants of the planners.
//!
//! Distances are metres, speeds m/s, times seconds. The gains scale the
//! vehicle's limiting acceleration `min(accel, decel)`.

/// Tolerance for comparing times that are nominally on the same step grid
pub const TIME_EPSILON: f64 = 1e-6;

/// Below `limit * SPEED_LOWER_BAND` the vehicle accelerates
pub const SPEED_LOWER_BAND: f64 = 0.995;
/// Above `limit * SPEED_UPPER_BAND` the vehicle decelerates
pub const SPEED_UPPER_BAND: f64 = 1.005;

/// Free acceleration / deceleration toward the lane speed limit
pub const FREE_GAIN: f64 = 0.4;
/// Deceleration once the safety margin would reach past the leader
pub const OVERLAP_GAIN: f64 = 1.9;
/// Additional deceleration when also faster than the leader
pub const CLOSING_GAIN: f64 = 3.2;
/// Emergency deceleration for vehicles that started at the route origin
pub const EMERGENCY_GAIN: f64 = 5.2;

/// Accelerating behind a leader needs at least this much room beyond the margin
pub const ACCELERATION_ROOM: f64 = 5.0;
/// Within this distance of contact the follower adopts the leader's speed
pub const CREEP_BAND: f64 = 2.0;
/// Within this distance, a follower faster than `leader + SPEED_SLACK` adopts the leader's speed
pub const MATCH_BAND: f64 = 5.0;
pub const SPEED_SLACK: f64 = 0.2;
/// Closing band for the extra deceleration of route-origin vehicles
pub const CLOSING_BAND: f64 = 8.0;
/// Emergency band for route-origin vehicles
pub const EMERGENCY_BAND: f64 = 4.0;

/// Vehicles that have not yet advanced past this position are still entering
pub const ENTRY_ZONE: f64 = 8.0;
/// Past this position a margin violation can no longer be recovered
pub const RECOVERY_LIMIT: f64 = 5.2;
/// A vehicle admitted before this position counts as starting at the route origin
pub const ORIGIN_ZONE: f64 = 1.0;

/// Gap window (below contact) in which strict following locks in
pub const STRICT_GAP_BAND: f64 = 2.0;
/// Speed difference under which strict following locks in
pub const STRICT_SPEED_BAND: f64 = 0.5;
/// Overlap beyond the safety margin tolerated before a follow plan fails
pub const OVERLAP_SLACK: f64 = 0.3;

/// Follow plans starting closer than this to the route origin...
pub const STANDSTILL_START: f64 = 0.25;
/// ...start from this position instead
pub const STANDSTILL_NUDGE: f64 = 0.35;
