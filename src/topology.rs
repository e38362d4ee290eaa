//! Lane-topology resolver.
//!
//! Walks a vehicle's route edge by edge through the simulator's lane links
//! and records every lane crossed, junction-internal lanes included. Streams
//! share geometry, so the scheduler resolves one chain per stream and reuses
//! it for every later vehicle of that stream.

use crate::error::{PlanError, SimulationError};
use crate::logging::log;
use crate::models::{LaneChain, LaneId, LaneSegment, VehicleId};
use crate::simulation::Simulation;

/// Ordered lanes from the vehicle's current lane to the end of its route.
///
/// # Errors
///
/// Returns `TopologyUnavailable` if the vehicle has no lane, its lane is not
/// on its route, or no link leads into the next edge of the route.
pub fn resolve_lane_chain<S: Simulation + ?Sized>(
    simulation: &S,
    vehicle: &VehicleId,
) -> Result<LaneChain, PlanError> {
    let unavailable = |reason: String| PlanError::TopologyUnavailable {
        vehicle: vehicle.clone(),
        reason,
    };
    let from_simulation = |error: SimulationError| unavailable(error.to_string());

    let state = simulation.vehicle_state(vehicle).map_err(from_simulation)?;
    if state.lane_id.is_empty() {
        return Err(unavailable("vehicle is not on a lane".to_string()));
    }
    let route = simulation.route_edges(vehicle).map_err(from_simulation)?;
    let current_edge = simulation.lane_edge(&state.lane_id).map_err(from_simulation)?;
    let Some(edge_index) = route.iter().position(|edge| *edge == current_edge) else {
        return Err(unavailable(format!("edge {current_edge} is not on the route")));
    };

    let mut seen: Vec<LaneId> = vec![state.lane_id.clone()];
    let mut segments = vec![segment(simulation, &state.lane_id).map_err(from_simulation)?];
    let mut current_lane = state.lane_id;

    for next_edge in &route[edge_index + 1..] {
        let links = simulation.lane_links(&current_lane).map_err(from_simulation)?;
        let mut found = None;
        for link in links {
            if simulation.lane_edge(&link.to_lane).map_err(from_simulation)? == *next_edge {
                found = Some(link);
                break;
            }
        }
        let Some(link) = found else {
            return Err(unavailable(format!(
                "no link from {current_lane} into edge {next_edge}"
            )));
        };

        for lane in link.via_lane.into_iter().chain(std::iter::once(link.to_lane)) {
            if seen.contains(&lane) {
                continue;
            }
            segments.push(segment(simulation, &lane).map_err(from_simulation)?);
            seen.push(lane.clone());
            current_lane = lane;
        }
    }

    log!(
        "Resolved {} lanes for {} ({} edges on route)",
        segments.len(),
        vehicle,
        route.len()
    );
    Ok(LaneChain::new(segments))
}

fn segment<S: Simulation + ?Sized>(simulation: &S, lane: &LaneId) -> Result<LaneSegment, SimulationError> {
    Ok(LaneSegment::new(
        lane.clone(),
        simulation.lane_length(lane)?,
        simulation.lane_speed_limit(lane)?,
    ))
}
