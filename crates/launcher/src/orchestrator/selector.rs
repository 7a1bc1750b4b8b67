//! First-fit placement.

use crate::orchestrator::types::NodeCapacity;

/// Outcome of node selection. Running out of GPUs is an expected answer,
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeChoice<'a> {
    Node(&'a NodeCapacity),
    NoCapacity,
}

/// Pick the first node, in snapshot order, with at least one free GPU.
///
/// The choice is advisory: concurrent launches race on the same snapshot and
/// the cluster's admission has the final say.
pub fn select_node(capacity: &[NodeCapacity]) -> NodeChoice<'_> {
    capacity
        .iter()
        .find(|node| node.free() > 0)
        .map_or(NodeChoice::NoCapacity, NodeChoice::Node)
}
