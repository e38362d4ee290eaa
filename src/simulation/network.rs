use super::LaneLink;
use crate::models::{EdgeId, LaneId};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneNode {
    pub lane_id: LaneId,
    pub edge_id: EdgeId,
    pub length: f64,
    pub speed_limit: f64,
}

/// Connection weight; the junction-internal lane crossed, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkWeight {
    pub via: Option<NodeIndex>,
}

/// Lane-level road network: lanes are nodes, lane-to-lane links are edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneNetwork {
    pub graph: DiGraph<LaneNode, LinkWeight>,
    pub lane_to_index: HashMap<LaneId, NodeIndex>,
}

impl LaneNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            lane_to_index: HashMap::new(),
        }
    }

    /// Add a lane if it doesn't exist, return its `NodeIndex`
    pub fn add_lane(
        &mut self,
        lane_id: impl Into<LaneId>,
        edge_id: impl Into<EdgeId>,
        length: f64,
        speed_limit: f64,
    ) -> NodeIndex {
        let lane_id = lane_id.into();
        if let Some(&index) = self.lane_to_index.get(&lane_id) {
            return index;
        }
        let index = self.graph.add_node(LaneNode {
            lane_id: lane_id.clone(),
            edge_id: edge_id.into(),
            length,
            speed_limit,
        });
        self.lane_to_index.insert(lane_id, index);
        index
    }

    /// Link `from` into `to`, optionally through a junction-internal lane
    pub fn connect(&mut self, from: NodeIndex, to: NodeIndex, via: Option<NodeIndex>) {
        self.graph.add_edge(from, to, LinkWeight { via });
    }

    #[must_use]
    pub fn lane(&self, lane_id: &LaneId) -> Option<&LaneNode> {
        self.lane_to_index
            .get(lane_id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    /// Outgoing links of a lane, or `None` if the lane is unknown
    #[must_use]
    pub fn links(&self, lane_id: &LaneId) -> Option<Vec<LaneLink>> {
        let &index = self.lane_to_index.get(lane_id)?;
        let links = self
            .graph
            .edges(index)
            .filter_map(|edge| {
                let to_lane = self.graph.node_weight(edge.target())?.lane_id.clone();
                let via_lane = edge
                    .weight()
                    .via
                    .and_then(|via| self.graph.node_weight(via))
                    .map(|node| node.lane_id.clone());
                Some(LaneLink { to_lane, via_lane })
            })
            .collect();
        Some(links)
    }

    /// Lanes driven from `start` along `edges`, with the distance at which
    /// each lane begins relative to the start of `start`.
    ///
    /// Stops at the first edge no link leads into.
    #[must_use]
    pub fn route_lanes(&self, start: &LaneId, edges: &[EdgeId]) -> Vec<(LaneId, f64)> {
        let Some(first) = self.lane(start) else {
            return Vec::new();
        };
        let mut lanes = vec![(first.lane_id.clone(), 0.0)];
        let mut cumulative = first.length;
        let mut current = first.lane_id.clone();

        let remaining = edges
            .iter()
            .position(|edge| *edge == first.edge_id)
            .map_or(&[][..], |index| &edges[index + 1..]);

        for next_edge in remaining {
            let Some(link) = self.links(&current).and_then(|links| {
                links.into_iter().find(|link| {
                    self.lane(&link.to_lane)
                        .is_some_and(|lane| lane.edge_id == *next_edge)
                })
            }) else {
                break;
            };
            for lane_id in link.via_lane.into_iter().chain(std::iter::once(link.to_lane)) {
                if lanes.iter().any(|(seen, _)| *seen == lane_id) {
                    continue;
                }
                let length = self.lane(&lane_id).map_or(0.0, |lane| lane.length);
                lanes.push((lane_id.clone(), cumulative));
                cumulative += length;
                current = lane_id;
            }
        }
        lanes
    }
}

impl Default for LaneNetwork {
    fn default() -> Self {
        Self::new()
    }
}
