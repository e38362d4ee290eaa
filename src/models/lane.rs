use super::LaneId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneSegment {
    pub lane_id: LaneId,
    pub length: f64,
    pub speed_limit: f64,
}

impl LaneSegment {
    #[must_use]
    pub fn new(lane_id: impl Into<LaneId>, length: f64, speed_limit: f64) -> Self {
        Self {
            lane_id: lane_id.into(),
            length,
            speed_limit,
        }
    }
}

/// Position resolved against a lane chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneLocation<'a> {
    pub index: usize,
    pub segment: &'a LaneSegment,
    pub offset: f64,
}

/// Ordered lanes from a stream's admission point to the end of its route.
///
/// Keeps a cumulative-length prefix table so offset-to-lane lookups are a
/// binary search instead of a walk over every lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneChain {
    segments: Vec<LaneSegment>,
    // starts[i] = sum of the lengths of segments[..i]
    starts: Vec<f64>,
    total_length: f64,
}

impl LaneChain {
    #[must_use]
    pub fn new(segments: Vec<LaneSegment>) -> Self {
        let mut starts = Vec::with_capacity(segments.len());
        let mut cumulative = 0.0;
        for segment in &segments {
            starts.push(cumulative);
            cumulative += segment.length;
        }
        Self {
            segments,
            starts,
            total_length: cumulative,
        }
    }

    #[must_use]
    pub fn segments(&self) -> &[LaneSegment] {
        &self.segments
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    #[must_use]
    pub fn total_length(&self) -> f64 {
        self.total_length
    }

    /// Distance from the chain start to the beginning of lane `index`
    #[must_use]
    pub fn start_of(&self, index: usize) -> Option<f64> {
        self.starts.get(index).copied()
    }

    #[must_use]
    pub fn contains(&self, lane_id: &LaneId) -> bool {
        self.segments.iter().any(|segment| &segment.lane_id == lane_id)
    }

    /// Map a distance along the chain to a lane and lane-local offset.
    ///
    /// Negative positions resolve to the start of the first lane; positions
    /// past the end resolve to the last lane, clamped to its length.
    #[must_use]
    pub fn locate(&self, position: f64) -> Option<LaneLocation<'_>> {
        if self.segments.is_empty() {
            return None;
        }
        if position <= 0.0 {
            return Some(LaneLocation {
                index: 0,
                segment: &self.segments[0],
                offset: 0.0,
            });
        }

        let index = self
            .starts
            .partition_point(|start| *start <= position)
            .saturating_sub(1);
        let segment = &self.segments[index];
        let offset = (position - self.starts[index]).min(segment.length);

        Some(LaneLocation {
            index,
            segment,
            offset,
        })
    }

    /// Speed limit of the lane containing `position` (0.0 for an empty chain)
    #[must_use]
    pub fn speed_limit_at(&self, position: f64) -> f64 {
        self.locate(position)
            .map_or(0.0, |location| location.segment.speed_limit)
    }
}
