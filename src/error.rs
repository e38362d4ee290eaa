//! Error taxonomy of the planner and scheduler.
//!
//! Planner-level failures never unwind through the scheduler: they come
//! back as values so the caller can retry at a later entry time or withdraw
//! the vehicle. A leader trajectory with no sample at or after the queried
//! time is not an error at all; the follow planner treats that step as
//! unconstrained.

use crate::models::{EdgeId, LaneId, VehicleId};

/// Failures reported by the simulation collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    #[error("unknown vehicle {0}")]
    UnknownVehicle(VehicleId),

    #[error("unknown lane {0}")]
    UnknownLane(LaneId),

    #[error("unknown edge {0}")]
    UnknownEdge(EdgeId),

    #[error("vehicle {0} has no route")]
    UnknownRoute(VehicleId),
}

/// Failures of a single planning call (resolver, resampler or planner).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    /// No successor lane leads into the next edge of the route. Fatal for
    /// the vehicle being admitted.
    #[error("lane topology unavailable for {vehicle}: {reason}")]
    TopologyUnavailable { vehicle: VehicleId, reason: String },

    /// The follower would violate its safety margin at a point where a
    /// hard stop can no longer recover the gap.
    #[error("{vehicle} cannot follow its leader safely (violation at t={time:.2}s)")]
    MergeInfeasible { vehicle: VehicleId, time: f64 },

    /// The vehicle already stands at or beyond the requested end offset.
    #[error("{vehicle} has nothing left to plan")]
    EmptyLeg { vehicle: VehicleId },

    #[error("invalid resampling boundary: {start} -> {end}")]
    InvalidBoundary { start: f64, end: f64 },

    /// Integration did not reach the end offset within the step budget.
    #[error("{vehicle} did not reach its end offset within {steps} steps")]
    StepBudgetExceeded { vehicle: VehicleId, steps: usize },
}

/// Failures of an admission or a cascade repair.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error("{0} does not belong to any configured stream")]
    UnknownStream(VehicleId),

    #[error("{0} is already scheduled")]
    AlreadyAdmitted(VehicleId),

    #[error("{0} is not on a lane yet and was withdrawn")]
    NotOnLane(VehicleId),

    #[error("{vehicle} was withdrawn: lane topology unavailable ({reason})")]
    TopologyUnavailable { vehicle: VehicleId, reason: String },

    /// Entry-time retries were exhausted; the vehicle was withdrawn.
    #[error("{vehicle} was withdrawn: no feasible merge entry after {retries} retries")]
    MergeInfeasible { vehicle: VehicleId, retries: usize },

    #[error("planning failed: {0}")]
    Plan(#[from] PlanError),

    #[error("simulation query failed: {0}")]
    Simulation(#[from] SimulationError),
}

/// Invalid scheduler configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
