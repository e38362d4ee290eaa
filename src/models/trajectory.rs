use super::{LaneChain, LaneId, VehicleId};
use crate::constants::TIME_EPSILON;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    /// Distance travelled along the route from the start of the lane chain
    pub position: f64,
    pub speed: f64,
    pub lane_id: LaneId,
    pub lane_offset: f64,
}

/// Kinematic profile as produced by a planner, before lanes are attached
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub times: Vec<f64>,
    pub positions: Vec<f64>,
    pub speeds: Vec<f64>,
}

impl Profile {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            times: Vec::with_capacity(capacity),
            positions: Vec::with_capacity(capacity),
            speeds: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, time: f64, position: f64, speed: f64) {
        self.times.push(time);
        self.positions.push(position);
        self.speeds.push(speed);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Static description shared by every trajectory of one vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryFrame {
    pub vehicle_id: VehicleId,
    pub lane_chain: Arc<LaneChain>,
    /// Vehicle length plus head clearance; lanes are resolved at the front bumper
    pub head_offset: f64,
    /// Vehicle length plus the configured safety gap
    pub safety_margin: f64,
    /// Fixed simulation step the samples are spaced by
    pub step: f64,
}

/// A planned motion, sampled on the simulation's fixed time grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub frame: TrajectoryFrame,
    pub samples: Vec<Sample>,
}

impl Trajectory {
    /// Attach lane/offset to every sample of `profile` via the frame's lane chain.
    #[must_use]
    pub fn from_profile(frame: TrajectoryFrame, profile: &Profile) -> Self {
        let samples = profile
            .times
            .iter()
            .zip(&profile.positions)
            .zip(&profile.speeds)
            .map(|((&time, &position), &speed)| {
                let (lane_id, lane_offset) = resolve_lane(&frame, position);
                Sample {
                    time,
                    position,
                    speed,
                    lane_id,
                    lane_offset,
                }
            })
            .collect();
        Self { frame, samples }
    }

    #[must_use]
    pub fn empty(frame: TrajectoryFrame) -> Self {
        Self {
            frame,
            samples: Vec::new(),
        }
    }

    #[must_use]
    pub fn vehicle_id(&self) -> &VehicleId {
        &self.frame.vehicle_id
    }

    #[must_use]
    pub fn safety_margin(&self) -> f64 {
        self.frame.safety_margin
    }

    #[must_use]
    pub fn lane_chain(&self) -> &LaneChain {
        &self.frame.lane_chain
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    #[must_use]
    pub fn profile(&self) -> Profile {
        let mut profile = Profile::with_capacity(self.samples.len());
        for sample in &self.samples {
            profile.push(sample.time, sample.position, sample.speed);
        }
        profile
    }

    /// First sample whose time is at or after `time`
    #[must_use]
    pub fn sample_at_or_after(&self, time: f64) -> Option<&Sample> {
        let index = self
            .samples
            .partition_point(|sample| sample.time < time - TIME_EPSILON);
        self.samples.get(index)
    }

    /// No sample remains at or after `time`
    #[must_use]
    pub fn is_exhausted_at(&self, time: f64) -> bool {
        self.sample_at_or_after(time).is_none()
    }

    /// Time of the first sample whose position exceeds `position`
    #[must_use]
    pub fn time_past_position(&self, position: f64) -> Option<f64> {
        self.samples
            .iter()
            .find(|sample| sample.position > position)
            .map(|sample| sample.time)
    }

    /// Drop everything from the first sample beyond `position` onwards.
    #[must_use]
    pub fn truncate_before_position(&self, position: f64) -> Self {
        let keep = self
            .samples
            .iter()
            .position(|sample| sample.position > position)
            .unwrap_or(self.samples.len());
        Self {
            frame: self.frame.clone(),
            samples: self.samples[..keep].to_vec(),
        }
    }

    /// Split into (samples strictly before `time`, samples at or after `time`).
    #[must_use]
    pub fn split_at_time(&self, time: f64) -> (Self, Self) {
        let index = self
            .samples
            .partition_point(|sample| sample.time < time - TIME_EPSILON);
        let (before, after) = self.samples.split_at(index);
        (
            Self {
                frame: self.frame.clone(),
                samples: before.to_vec(),
            },
            Self {
                frame: self.frame.clone(),
                samples: after.to_vec(),
            },
        )
    }

    /// Append `tail` after `self`.
    ///
    /// `tail` is expected to begin exactly one step after `self` ends; any
    /// overlap or gap is reported, and lanes outside the chain are reported
    /// as a topology inconsistency.
    #[must_use]
    pub fn concatenate(&self, tail: &Self) -> Self {
        if self.frame.vehicle_id != tail.frame.vehicle_id {
            log::error!(
                "Concatenating trajectories of different vehicles: {} and {}",
                self.frame.vehicle_id,
                tail.frame.vehicle_id
            );
        }
        if let (Some(last), Some(first)) = (self.last(), tail.first()) {
            let gap = first.time - last.time;
            if (gap - self.frame.step).abs() > TIME_EPSILON {
                log::warn!(
                    "Concatenate trajectory mismatch for {}: head ends at {:.3}, tail starts at {:.3}",
                    self.frame.vehicle_id,
                    last.time,
                    first.time
                );
            }
        }

        let mut samples = Vec::with_capacity(self.samples.len() + tail.samples.len());
        samples.extend_from_slice(&self.samples);
        samples.extend_from_slice(&tail.samples);
        let joined = Self {
            frame: self.frame.clone(),
            samples,
        };

        let stray = joined.lanes_outside_chain();
        if !stray.is_empty() {
            log::error!(
                "Topology inconsistency in trajectory of {}: lanes {:?} are not part of its lane chain",
                joined.frame.vehicle_id,
                stray
            );
            debug_assert!(stray.is_empty(), "sample lanes outside the lane chain");
        }
        joined
    }

    /// Lanes referenced by samples that the lane chain does not contain
    #[must_use]
    pub fn lanes_outside_chain(&self) -> Vec<LaneId> {
        let mut stray: Vec<LaneId> = Vec::new();
        for sample in &self.samples {
            if !self.frame.lane_chain.contains(&sample.lane_id) && !stray.contains(&sample.lane_id) {
                stray.push(sample.lane_id.clone());
            }
        }
        stray
    }
}

fn resolve_lane(frame: &TrajectoryFrame, position: f64) -> (LaneId, f64) {
    frame
        .lane_chain
        .locate(position + frame.head_offset)
        .map_or_else(
            || (LaneId::new(""), 0.0),
            |location| (location.segment.lane_id.clone(), location.offset),
        )
}
