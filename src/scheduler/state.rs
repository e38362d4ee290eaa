use crate::models::{CommitmentRecord, LaneChain, Stream, Trajectory, VehicleId};
use crate::planner::VehiclePlan;
use std::collections::HashMap;
use std::sync::Arc;

/// Arrival of a vehicle on its stream
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionRecord {
    pub vehicle_id: VehicleId,
    pub time: f64,
    pub speed: f64,
    pub position: f64,
}

/// Planning context kept per scheduled vehicle so cascades can re-plan it
/// without querying the simulator again.
#[derive(Debug, Clone)]
pub struct ScheduledVehicle {
    pub stream: Stream,
    pub plan: VehiclePlan,
}

/// Mutable scheduler state; only ever touched under the admission lock.
#[derive(Debug, Default)]
pub struct SchedulerState {
    pub chains: HashMap<Stream, Arc<LaneChain>>,
    pub admissions: HashMap<Stream, Vec<AdmissionRecord>>,
    pub vehicles: HashMap<VehicleId, ScheduledVehicle>,
    pub trajectories: HashMap<VehicleId, Arc<Trajectory>>,
    pub commitments: Vec<CommitmentRecord>,
}

impl SchedulerState {
    /// Latest admitted vehicle of `stream` that still has a scheduled trajectory
    pub fn stream_leader(&self, stream: Stream) -> Option<Arc<Trajectory>> {
        self.admissions
            .get(&stream)?
            .iter()
            .rev()
            .find_map(|record| self.trajectories.get(&record.vehicle_id).cloned())
    }

    pub fn record_admission(&mut self, stream: Stream, record: AdmissionRecord) {
        self.admissions.entry(stream).or_default().push(record);
    }

    /// Forget everything scheduled for `vehicle`; commitments are history and stay.
    pub fn forget(&mut self, vehicle: &VehicleId) -> bool {
        self.vehicles.remove(vehicle);
        self.trajectories.remove(vehicle).is_some()
    }
}
