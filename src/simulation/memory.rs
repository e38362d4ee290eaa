//! Kinematic in-memory simulator.
//!
//! Vehicles only move when commanded through `move_to`, which is exactly
//! how the scheduler drives a real simulator: every tick it teleports each
//! controlled vehicle onto its scheduled lane and offset.

use super::{LaneLink, LaneNetwork, Simulation, VehicleParams, VehicleState};
use crate::error::SimulationError;
use crate::models::{EdgeId, LaneId, VehicleId};
use indexmap::IndexMap;
use std::collections::HashMap;

pub const MAINLINE_ROUTE: &str = "mainline";
pub const RAMP_ROUTE: &str = "ramp";

#[derive(Debug, Clone)]
struct SimVehicle {
    params: VehicleParams,
    route: Vec<EdgeId>,
    state: VehicleState,
    // Lanes along the route and where each begins, relative to the depart lane
    route_lanes: Vec<(LaneId, f64)>,
    // Route position of the front bumper at departure
    depart_position: f64,
    // Odometer at the last commanded placement
    last_placed: Option<f64>,
}

impl SimVehicle {
    fn route_position(&self, lane: &LaneId, offset: f64) -> Option<f64> {
        self.route_lanes
            .iter()
            .find(|(lane_id, _)| lane_id == lane)
            .map(|(_, start)| start + offset)
    }

    /// Drive on at the current speed for `step` seconds
    fn advance(&mut self, step: f64) {
        let position = self.depart_position + self.state.distance + self.state.speed * step;
        let Some((lane, start)) = self.route_lanes.iter().rev().find(|(_, start)| *start <= position) else {
            return;
        };
        self.state.lane_id = lane.clone();
        self.state.lane_offset = position - start;
        self.state.distance += self.state.speed * step;
    }
}

#[derive(Debug, Clone)]
pub struct InMemorySimulation {
    network: LaneNetwork,
    time: f64,
    step: f64,
    vehicles: IndexMap<VehicleId, SimVehicle>,
    routes: HashMap<String, Vec<EdgeId>>,
}

impl InMemorySimulation {
    #[must_use]
    pub fn new(network: LaneNetwork, step: f64) -> Self {
        Self {
            network,
            time: 0.0,
            step,
            vehicles: IndexMap::new(),
            routes: HashMap::new(),
        }
    }

    #[must_use]
    pub fn network(&self) -> &LaneNetwork {
        &self.network
    }

    pub fn add_route(&mut self, name: impl Into<String>, edges: Vec<EdgeId>) {
        self.routes.insert(name.into(), edges);
    }

    /// First lane (by lane index) of the route's first edge
    #[must_use]
    pub fn depart_lane(&self, route: &str) -> Option<LaneId> {
        let first_edge = self.routes.get(route)?.first()?;
        self.network
            .graph
            .node_weights()
            .filter(|lane| lane.edge_id == *first_edge)
            .map(|lane| lane.lane_id.clone())
            .min_by(|a, b| a.as_str().cmp(b.as_str()))
    }

    /// Insert a vehicle with its front bumper at `offset` on `lane`.
    ///
    /// # Errors
    ///
    /// Returns an error if the route or lane is unknown.
    pub fn spawn(
        &mut self,
        vehicle: impl Into<VehicleId>,
        route: &str,
        params: VehicleParams,
        lane: &LaneId,
        offset: f64,
        speed: f64,
    ) -> Result<(), SimulationError> {
        let vehicle = vehicle.into();
        let edges = self
            .routes
            .get(route)
            .cloned()
            .ok_or_else(|| SimulationError::UnknownRoute(vehicle.clone()))?;
        if self.network.lane(lane).is_none() {
            return Err(SimulationError::UnknownLane(lane.clone()));
        }

        let route_lanes = self.network.route_lanes(lane, &edges);
        self.vehicles.insert(
            vehicle,
            SimVehicle {
                params,
                route: edges,
                state: VehicleState {
                    distance: 0.0,
                    lane_id: lane.clone(),
                    lane_offset: offset,
                    speed,
                    time_loss: 0.0,
                    fuel_rate: 0.0,
                },
                route_lanes,
                depart_position: offset,
                last_placed: None,
            },
        );
        Ok(())
    }

    /// Insert a vehicle at the start of its route's first edge, front bumper
    /// one vehicle length in.
    ///
    /// # Errors
    ///
    /// Returns an error if the route is unknown.
    pub fn spawn_at_depart(
        &mut self,
        vehicle: impl Into<VehicleId>,
        route: &str,
        params: VehicleParams,
        speed: f64,
    ) -> Result<(), SimulationError> {
        let vehicle = vehicle.into();
        let lane = self
            .depart_lane(route)
            .ok_or_else(|| SimulationError::UnknownRoute(vehicle.clone()))?;
        self.spawn(vehicle, route, params, &lane, params.length, speed)
    }

    /// Register a vehicle that is waiting for insertion and has no lane yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the route is unknown.
    pub fn spawn_pending(
        &mut self,
        vehicle: impl Into<VehicleId>,
        route: &str,
        params: VehicleParams,
    ) -> Result<(), SimulationError> {
        let vehicle = vehicle.into();
        let edges = self
            .routes
            .get(route)
            .cloned()
            .ok_or_else(|| SimulationError::UnknownRoute(vehicle.clone()))?;
        self.vehicles.insert(
            vehicle,
            SimVehicle {
                params,
                route: edges,
                state: VehicleState {
                    distance: 0.0,
                    lane_id: LaneId::new(""),
                    lane_offset: 0.0,
                    speed: 0.0,
                    time_loss: 0.0,
                    fuel_rate: 0.0,
                },
                route_lanes: Vec::new(),
                depart_position: 0.0,
                last_placed: None,
            },
        );
        Ok(())
    }

    /// Advance the clock by one step. Placed vehicles keep driving at the
    /// speed of their last commanded move.
    pub fn step(&mut self) {
        self.time += self.step;
        for vehicle in self.vehicles.values_mut() {
            vehicle.advance(self.step);
            if vehicle.params.max_speed > 0.0 {
                let ratio = (vehicle.state.speed / vehicle.params.max_speed).clamp(0.0, 1.0);
                vehicle.state.time_loss += self.step * (1.0 - ratio);
            }
        }
    }

    fn vehicle(&self, vehicle: &VehicleId) -> Result<&SimVehicle, SimulationError> {
        self.vehicles
            .get(vehicle)
            .ok_or_else(|| SimulationError::UnknownVehicle(vehicle.clone()))
    }
}

impl Simulation for InMemorySimulation {
    fn time(&self) -> f64 {
        self.time
    }

    fn step_length(&self) -> f64 {
        self.step
    }

    fn vehicle_ids(&self) -> Vec<VehicleId> {
        self.vehicles.keys().cloned().collect()
    }

    fn has_vehicle(&self, vehicle: &VehicleId) -> bool {
        self.vehicles.contains_key(vehicle)
    }

    fn vehicle_state(&self, vehicle: &VehicleId) -> Result<VehicleState, SimulationError> {
        self.vehicle(vehicle).map(|v| v.state.clone())
    }

    fn vehicle_params(&self, vehicle: &VehicleId) -> Result<VehicleParams, SimulationError> {
        self.vehicle(vehicle).map(|v| v.params)
    }

    fn route_edges(&self, vehicle: &VehicleId) -> Result<Vec<EdgeId>, SimulationError> {
        let route = &self.vehicle(vehicle)?.route;
        if route.is_empty() {
            return Err(SimulationError::UnknownRoute(vehicle.clone()));
        }
        Ok(route.clone())
    }

    fn lane_edge(&self, lane: &LaneId) -> Result<EdgeId, SimulationError> {
        self.network
            .lane(lane)
            .map(|node| node.edge_id.clone())
            .ok_or_else(|| SimulationError::UnknownLane(lane.clone()))
    }

    fn lane_links(&self, lane: &LaneId) -> Result<Vec<LaneLink>, SimulationError> {
        self.network
            .links(lane)
            .ok_or_else(|| SimulationError::UnknownLane(lane.clone()))
    }

    fn lane_length(&self, lane: &LaneId) -> Result<f64, SimulationError> {
        self.network
            .lane(lane)
            .map(|node| node.length)
            .ok_or_else(|| SimulationError::UnknownLane(lane.clone()))
    }

    fn lane_speed_limit(&self, lane: &LaneId) -> Result<f64, SimulationError> {
        self.network
            .lane(lane)
            .map(|node| node.speed_limit)
            .ok_or_else(|| SimulationError::UnknownLane(lane.clone()))
    }

    fn move_to(&mut self, vehicle: &VehicleId, lane: &LaneId, offset: f64) -> Result<(), SimulationError> {
        if self.network.lane(lane).is_none() {
            return Err(SimulationError::UnknownLane(lane.clone()));
        }
        let step = self.step;
        let network = &self.network;
        let entry = self
            .vehicles
            .get_mut(vehicle)
            .ok_or_else(|| SimulationError::UnknownVehicle(vehicle.clone()))?;

        if entry.route_lanes.is_empty() {
            // First placement of a pending vehicle
            entry.route_lanes = network.route_lanes(lane, &entry.route);
            entry.depart_position = offset;
        }

        if let Some(route_position) = entry.route_position(lane, offset) {
            let distance = route_position - entry.depart_position;
            if let Some(previous) = entry.last_placed {
                if step > 0.0 {
                    entry.state.speed = ((distance - previous) / step).max(0.0);
                }
            }
            entry.state.distance = distance;
            entry.last_placed = Some(distance);
        } else {
            log::warn!("{vehicle} moved to {lane}, which is not on its route");
        }
        entry.state.lane_id = lane.clone();
        entry.state.lane_offset = offset;
        Ok(())
    }

    fn remove_vehicle(&mut self, vehicle: &VehicleId) -> Result<(), SimulationError> {
        self.vehicles
            .shift_remove(vehicle)
            .map(|_| ())
            .ok_or_else(|| SimulationError::UnknownVehicle(vehicle.clone()))
    }
}

/// Mainline and on-ramp joining into a shared segment.
///
/// ```text
/// E0_0 (975 m) --:J1_0_0 (7.56 m)--\
///                                   E2_0 (300 m) --:J2_0_0 (5 m)-- E3_0 (200 m)
/// E1_0 (955 m) --:J1_1_0 (6.47 m)--/
/// ```
#[must_use]
pub fn two_stream_network() -> LaneNetwork {
    let mut network = LaneNetwork::new();
    let mainline = network.add_lane("E0_0", "E0", 975.0, 20.0);
    let mainline_junction = network.add_lane(":J1_0_0", ":J1_0", 7.56, 20.0);
    let ramp = network.add_lane("E1_0", "E1", 955.0, 16.67);
    let ramp_junction = network.add_lane(":J1_1_0", ":J1_1", 6.47, 16.67);
    let shared = network.add_lane("E2_0", "E2", 300.0, 20.0);
    let exit_junction = network.add_lane(":J2_0_0", ":J2_0", 5.0, 20.0);
    let exit = network.add_lane("E3_0", "E3", 200.0, 20.0);

    network.connect(mainline, shared, Some(mainline_junction));
    network.connect(ramp, shared, Some(ramp_junction));
    network.connect(shared, exit, Some(exit_junction));
    network
}

/// [`two_stream_network`] with the mainline and ramp routes registered
#[must_use]
pub fn two_stream_simulation(step: f64) -> InMemorySimulation {
    let mut simulation = InMemorySimulation::new(two_stream_network(), step);
    simulation.add_route(
        MAINLINE_ROUTE,
        vec![EdgeId::from("E0"), EdgeId::from("E2"), EdgeId::from("E3")],
    );
    simulation.add_route(
        RAMP_ROUTE,
        vec![EdgeId::from("E1"), EdgeId::from("E2"), EdgeId::from("E3")],
    );
    simulation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_at_depart() {
        let mut simulation = two_stream_simulation(0.1);
        simulation
            .spawn_at_depart("m.0", MAINLINE_ROUTE, VehicleParams::default(), 14.0)
            .expect("spawn");
        let state = simulation.vehicle_state(&VehicleId::from("m.0")).expect("state");
        assert_eq!(state.lane_id, LaneId::from("E0_0"));
        assert_eq!(state.lane_offset, 5.0);
        assert_eq!(state.distance, 0.0);
        assert_eq!(simulation.vehicle_ids(), vec![VehicleId::from("m.0")]);
    }

    #[test]
    fn test_move_to_updates_odometer_across_lanes() {
        let mut simulation = two_stream_simulation(0.5);
        let id = VehicleId::from("r.0");
        simulation
            .spawn_at_depart(id.clone(), RAMP_ROUTE, VehicleParams::default(), 10.0)
            .expect("spawn");

        simulation.step();
        simulation
            .move_to(&id, &LaneId::from(":J1_1_0"), 1.0)
            .expect("move");
        let state = simulation.vehicle_state(&id).expect("state");
        // 955 m ramp lane + 1 m into the junction, minus the 5 m depart offset
        assert!((state.distance - 951.0).abs() < 1e-9);
        assert_eq!(state.lane_id, LaneId::from(":J1_1_0"));
    }

    #[test]
    fn test_step_drives_at_commanded_speed() {
        let mut simulation = two_stream_simulation(0.1);
        let id = VehicleId::from("m.0");
        simulation
            .spawn_at_depart(id.clone(), MAINLINE_ROUTE, VehicleParams::default(), 10.0)
            .expect("spawn");
        let lane = LaneId::from("E0_0");
        simulation.move_to(&id, &lane, 970.0).expect("move");
        simulation.step();
        simulation.move_to(&id, &lane, 972.0).expect("move");
        assert!((simulation.vehicle_state(&id).expect("state").speed - 20.0).abs() < 1e-9);

        // 2 m per step carries it over the lane end into the junction
        simulation.step();
        simulation.step();
        let state = simulation.vehicle_state(&id).expect("state");
        assert_eq!(state.lane_id, LaneId::from(":J1_0_0"));
        assert!((state.lane_offset - 1.0).abs() < 1e-9);
        assert!((state.distance - 971.0).abs() < 1e-9);
    }

    #[test]
    fn test_pending_vehicle_has_no_lane() {
        let mut simulation = two_stream_simulation(0.1);
        simulation
            .spawn_pending("m.7", MAINLINE_ROUTE, VehicleParams::default())
            .expect("spawn");
        let state = simulation.vehicle_state(&VehicleId::from("m.7")).expect("state");
        assert!(state.lane_id.is_empty());
    }

    #[test]
    fn test_unknown_lookups() {
        let mut simulation = two_stream_simulation(0.1);
        let ghost = VehicleId::from("m.9");
        assert_eq!(
            simulation.vehicle_state(&ghost),
            Err(SimulationError::UnknownVehicle(ghost.clone()))
        );
        assert!(matches!(
            simulation.lane_length(&LaneId::from("nowhere")),
            Err(SimulationError::UnknownLane(_))
        ));
        assert!(simulation.remove_vehicle(&ghost).is_err());
        assert!(simulation
            .spawn_at_depart("x.0", "no-route", VehicleParams::default(), 0.0)
            .is_err());
    }

    #[test]
    fn test_remove_vehicle() {
        let mut simulation = two_stream_simulation(0.1);
        simulation
            .spawn_at_depart("m.0", MAINLINE_ROUTE, VehicleParams::default(), 0.0)
            .expect("spawn");
        simulation.remove_vehicle(&VehicleId::from("m.0")).expect("remove");
        assert!(simulation.vehicle_ids().is_empty());
    }
}
