//! The placement problem handed to a [`Solver`](crate::solver::Solver).
//!
//! A problem lists every replica in the fleet as a variable over the node
//! domain. Replicas that are already running carry a [`HardConstraint::Pin`],
//! so only pending replicas are actually free. Objectives are ordered; a
//! solver compares them lexicographically.

use std::collections::{BTreeMap, BTreeSet};

use zoneplace_state::{ConstraintRule, NodeId, RangeId, ReplicaId};

/// Solver output: chosen node per decision variable (pending replica).
pub type Assignment = BTreeMap<ReplicaId, NodeId>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaVar {
    pub replica_id: ReplicaId,
    pub range_id: RangeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardConstraint {
    /// The replica's node must (Required) or must not (Prohibited) be one of
    /// the nodes matching `rule`.
    Affinity {
        replica_id: ReplicaId,
        rule: ConstraintRule,
        matching: BTreeSet<NodeId>,
    },
    /// The replica stays where it runs.
    Pin { replica_id: ReplicaId, node_id: NodeId },
    /// No two of these replicas share a node.
    AllDifferent {
        range_id: RangeId,
        replicas: Vec<ReplicaId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Min,
    Max,
    /// Number of groups holding at least one replica.
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Maximize,
    Minimize,
}

/// How replicas are bucketed before aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grouping {
    /// Per range, one bucket per distinct value of `key` in the fleet.
    /// `members` maps a node to the bucket indexes of its values; per-range
    /// aggregates are summed across ranges.
    PerRange {
        key: String,
        members: BTreeMap<NodeId, Vec<usize>>,
        groups: usize,
    },
    /// Fleet-wide, one bucket per domain node.
    PerNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Objective {
    /// Name of the policy that contributed this objective.
    pub policy: &'static str,
    pub grouping: Grouping,
    pub aggregate: Aggregate,
    pub direction: Direction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Problem {
    /// Declared node domain, sorted.
    pub domain: Vec<NodeId>,
    /// Every replica taking part in the round, sorted by id.
    pub variables: Vec<ReplicaVar>,
    pub constraints: Vec<HardConstraint>,
    /// Soft objectives in priority order.
    pub objectives: Vec<Objective>,
}

impl Problem {
    /// Replicas held in place by a `Pin`.
    pub fn pinned(&self) -> BTreeMap<ReplicaId, NodeId> {
        self.constraints
            .iter()
            .filter_map(|c| match c {
                HardConstraint::Pin { replica_id, node_id } => Some((*replica_id, *node_id)),
                _ => None,
            })
            .collect()
    }

    /// The free variables: replicas with no `Pin`.
    pub fn decision_variables(&self) -> Vec<ReplicaVar> {
        let pinned = self.pinned();
        self.variables
            .iter()
            .filter(|v| !pinned.contains_key(&v.replica_id))
            .copied()
            .collect()
    }
}
