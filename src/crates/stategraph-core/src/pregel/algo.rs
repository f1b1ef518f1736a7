//! Pure step functions: merge, edge resolution, commit status
//!
//! Nothing here touches the checkpoint store or runs a node, so each piece of
//! the step algorithm can be tested on its own.

use crate::error::GraphError;
use crate::graph::{Edge, Graph, NodeId, END};
use crate::interrupt::{InterruptConfig, PendingInterrupt};
use crate::state::{State, StateError, StateSchema};
use serde_json::Value;
use stategraph_checkpoint::CheckpointStatus;
use std::collections::HashSet;

/// A run-time error attributed to the node that caused it
#[derive(Debug)]
pub(crate) struct NodeFailure {
    pub node: NodeId,
    pub error: GraphError,
}

impl NodeFailure {
    pub fn new(node: impl Into<NodeId>, error: GraphError) -> Self {
        Self {
            node: node.into(),
            error,
        }
    }
}

/// Merge each node's output into `state`, in the order given
///
/// A `null` output means the node changed nothing.
pub(crate) fn apply_outputs(
    schema: &StateSchema,
    state: &State,
    outputs: &[(NodeId, Value)],
) -> Result<State, NodeFailure> {
    let mut merged = state.clone();
    for (node, output) in outputs {
        if output.is_null() {
            continue;
        }
        merged = schema
            .merge(&merged, output)
            .map_err(|e| NodeFailure::new(node.clone(), merge_error(node, e)))?;
    }
    Ok(merged)
}

/// Map a state container error raised while merging `node`'s output
pub(crate) fn merge_error(node: &str, error: StateError) -> GraphError {
    match error {
        StateError::UnknownField(field) => GraphError::MergeSchema {
            node: node.to_string(),
            field,
        },
        other => GraphError::State(other),
    }
}

/// Resolve the outgoing edges of every executed node against `state`
///
/// Nodes are visited in the order given and each node's edges in
/// registration order. The result is deduplicated, keeping first occurrences,
/// so a node reached along two paths runs once.
pub(crate) fn next_frontier(
    graph: &Graph,
    state: &State,
    executed: &[NodeId],
) -> Result<Vec<NodeId>, NodeFailure> {
    let mut next = Vec::new();
    for node in executed {
        for edge in graph.edges_from(node) {
            match edge {
                Edge::Direct(target) => next.push(target.clone()),
                Edge::Conditional { router, branches } => {
                    let label = router(state);
                    match branches.get(&label) {
                        Some(target) => next.push(target.clone()),
                        None => {
                            return Err(NodeFailure::new(
                                node.clone(),
                                GraphError::Routing {
                                    node: node.clone(),
                                    label,
                                    expected: branches.keys().cloned().collect(),
                                },
                            ))
                        }
                    }
                }
            }
        }
    }
    Ok(dedup_preserving_order(next))
}

pub(crate) fn dedup_preserving_order(nodes: Vec<NodeId>) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    nodes
        .into_iter()
        .filter(|node| seen.insert(node.clone()))
        .collect()
}

/// Whether `frontier` ends the run: empty, or only `END`
pub(crate) fn is_finished(frontier: &[NodeId]) -> bool {
    frontier.iter().all(|node| node == END)
}

/// Status and pending interrupts for the checkpoint about to be committed
///
/// Interrupts take priority: a run that would finish but has an
/// after-interrupt pending stays suspended until resumed.
pub(crate) fn commit_status(
    interrupts: &InterruptConfig,
    wrote: &[NodeId],
    next: &[NodeId],
) -> (CheckpointStatus, Vec<PendingInterrupt>) {
    let pending = interrupts.pending_for(wrote, next);
    if !pending.is_empty() {
        (CheckpointStatus::AwaitingInterrupt, pending)
    } else if is_finished(next) {
        (CheckpointStatus::Completed, pending)
    } else {
        (CheckpointStatus::Running, pending)
    }
}
