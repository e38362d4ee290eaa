//! Seam to the external traffic simulator.
//!
//! The scheduler never owns the physics: it queries vehicle state and lane
//! topology through [`Simulation`] and realizes its plans with `move_to`.
//! [`memory::InMemorySimulation`] is a kinematic stand-in used by the tests,
//! the benchmarks and the replay binary.

pub mod memory;
mod network;

pub use network::{LaneNetwork, LaneNode};

use crate::error::SimulationError;
use crate::models::{EdgeId, LaneId, VehicleId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    /// Odometer distance since departure
    pub distance: f64,
    /// Empty while the vehicle has not been inserted on a lane
    pub lane_id: LaneId,
    /// Front-bumper offset on `lane_id`
    pub lane_offset: f64,
    pub speed: f64,
    /// Cumulative time lost against driving at maximum speed
    pub time_loss: f64,
    pub fuel_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleParams {
    pub length: f64,
    pub max_accel: f64,
    pub max_decel: f64,
    pub max_speed: f64,
}

impl VehicleParams {
    /// The weaker of the acceleration and deceleration capabilities
    #[must_use]
    pub fn limiting_acceleration(&self) -> f64 {
        self.max_accel.min(self.max_decel)
    }
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            length: 5.0,
            max_accel: 2.5,
            max_decel: 4.5,
            max_speed: 20.0,
        }
    }
}

/// Connection from a lane into a lane of the next edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneLink {
    pub to_lane: LaneId,
    /// Junction-internal lane crossed on the way, if any
    pub via_lane: Option<LaneId>,
}

/// Queries and commands the scheduler needs from the simulator.
pub trait Simulation {
    /// Current simulation clock in seconds
    fn time(&self) -> f64;

    /// Fixed step duration in seconds
    fn step_length(&self) -> f64;

    /// Vehicles currently in the simulation, in insertion order
    fn vehicle_ids(&self) -> Vec<VehicleId>;

    fn has_vehicle(&self, vehicle: &VehicleId) -> bool;

    /// # Errors
    ///
    /// Returns `UnknownVehicle` if the vehicle does not exist.
    fn vehicle_state(&self, vehicle: &VehicleId) -> Result<VehicleState, SimulationError>;

    /// # Errors
    ///
    /// Returns `UnknownVehicle` if the vehicle does not exist.
    fn vehicle_params(&self, vehicle: &VehicleId) -> Result<VehicleParams, SimulationError>;

    /// Ordered edges of the vehicle's assigned route
    ///
    /// # Errors
    ///
    /// Returns an error if the vehicle or its route is unknown.
    fn route_edges(&self, vehicle: &VehicleId) -> Result<Vec<EdgeId>, SimulationError>;

    /// # Errors
    ///
    /// Returns `UnknownLane` if the lane does not exist.
    fn lane_edge(&self, lane: &LaneId) -> Result<EdgeId, SimulationError>;

    /// # Errors
    ///
    /// Returns `UnknownLane` if the lane does not exist.
    fn lane_links(&self, lane: &LaneId) -> Result<Vec<LaneLink>, SimulationError>;

    /// # Errors
    ///
    /// Returns `UnknownLane` if the lane does not exist.
    fn lane_length(&self, lane: &LaneId) -> Result<f64, SimulationError>;

    /// # Errors
    ///
    /// Returns `UnknownLane` if the lane does not exist.
    fn lane_speed_limit(&self, lane: &LaneId) -> Result<f64, SimulationError>;

    /// Force the vehicle's front bumper to `offset` on `lane`
    ///
    /// # Errors
    ///
    /// Returns an error if the vehicle or lane is unknown.
    fn move_to(&mut self, vehicle: &VehicleId, lane: &LaneId, offset: f64) -> Result<(), SimulationError>;

    /// Withdraw the vehicle from the simulation
    ///
    /// # Errors
    ///
    /// Returns `UnknownVehicle` if the vehicle does not exist.
    fn remove_vehicle(&mut self, vehicle: &VehicleId) -> Result<(), SimulationError>;
}
