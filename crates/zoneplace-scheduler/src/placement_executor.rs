//! Placement executor: applies a solver assignment to the topology store.
//!
//! The whole assignment is committed in one write transaction: either every
//! replica flips to `running` on its chosen node, or nothing changes.

use std::collections::BTreeMap;

use tracing::{debug, info};

use zoneplace_placement::Assignment;
use zoneplace_state::{NodeId, StateStore};

use crate::error::SchedulerResult;

/// Result of committing an assignment.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub committed: usize,
    /// Node id → replicas newly placed on it.
    pub per_node: BTreeMap<NodeId, usize>,
}

/// Commit `assignment`, marking each replica running on its node.
pub fn execute(assignment: &Assignment, state: &StateStore) -> SchedulerResult<ExecutionResult> {
    if assignment.is_empty() {
        debug!("empty assignment, nothing to commit");
        return Ok(ExecutionResult::default());
    }

    let committed = state.commit_assignment(assignment)?;

    let mut per_node: BTreeMap<NodeId, usize> = BTreeMap::new();
    for node in assignment.values() {
        *per_node.entry(*node).or_default() += 1;
    }
    for (node, count) in &per_node {
        info!(node = *node, replicas = *count, "replicas placed on node");
    }

    Ok(ExecutionResult {
        committed,
        per_node,
    })
}
