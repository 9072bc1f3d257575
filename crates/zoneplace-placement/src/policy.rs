//! The policy library.
//!
//! Policies are static, typed descriptions of what a placement must (hard)
//! or should (soft) satisfy. [`expand`] joins them against a topology
//! snapshot into a [`Problem`]. Hard policies become constraints; soft
//! policies become objectives, ranked in the order the policies are given.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;
use zoneplace_state::{ConstraintRule, NodeId, RangeId, ReplicaId, Topology};

use crate::convert::{label_groups, matching_nodes, replica_vars};
use crate::problem::{Aggregate, Direction, Grouping, HardConstraint, Objective, Problem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Hard,
    Soft,
}

/// What a policy ranges over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyScope {
    /// Every replica's node comes from the registered node set.
    NodeDomain,
    /// Each replica's compiled Required/Prohibited rows.
    ReplicaConstraints,
    /// Replicas sharing a range.
    Range,
    /// Replicas already committed to a node.
    RunningReplicas,
    /// Replicas of each range, bucketed by a node label key.
    RangeByLabel(&'static str),
    /// All replicas, bucketed by node.
    Node,
}

/// One soft objective term contributed by a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectiveTerm {
    pub aggregate: Aggregate,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub name: &'static str,
    pub kind: PolicyKind,
    pub scope: PolicyScope,
    /// Empty for hard policies.
    pub objectives: &'static [ObjectiveTerm],
}

/// Raise the emptiest group, then flatten the fullest one.
const BALANCE: &[ObjectiveTerm] = &[
    ObjectiveTerm {
        aggregate: Aggregate::Min,
        direction: Direction::Maximize,
    },
    ObjectiveTerm {
        aggregate: Aggregate::Max,
        direction: Direction::Minimize,
    },
];

pub const NODE_DOMAIN: Policy = Policy {
    name: "node-domain",
    kind: PolicyKind::Hard,
    scope: PolicyScope::NodeDomain,
    objectives: &[],
};

pub const AFFINITY: Policy = Policy {
    name: "affinity-anti-affinity",
    kind: PolicyKind::Hard,
    scope: PolicyScope::ReplicaConstraints,
    objectives: &[],
};

pub const DISTINCT_NODES_PER_RANGE: Policy = Policy {
    name: "distinct-nodes-per-range",
    kind: PolicyKind::Hard,
    scope: PolicyScope::Range,
    objectives: &[],
};

pub const DO_NOT_REASSIGN: Policy = Policy {
    name: "do-not-reassign",
    kind: PolicyKind::Hard,
    scope: PolicyScope::RunningReplicas,
    objectives: &[],
};

pub const SPREAD_ACROSS_REGION: Policy = Policy {
    name: "spread-across-region",
    kind: PolicyKind::Soft,
    scope: PolicyScope::RangeByLabel("region"),
    objectives: BALANCE,
};

pub const SPREAD_ACROSS_AZ: Policy = Policy {
    name: "spread-across-az",
    kind: PolicyKind::Soft,
    scope: PolicyScope::RangeByLabel("az"),
    objectives: BALANCE,
};

pub const USE_MORE_NODES: Policy = Policy {
    name: "use-more-nodes",
    kind: PolicyKind::Soft,
    scope: PolicyScope::Node,
    objectives: BALANCE,
};

/// Every policy, hard ones first, soft ones in priority order.
pub const LIBRARY: [Policy; 7] = [
    NODE_DOMAIN,
    AFFINITY,
    DISTINCT_NODES_PER_RANGE,
    DO_NOT_REASSIGN,
    SPREAD_ACROSS_REGION,
    SPREAD_ACROSS_AZ,
    USE_MORE_NODES,
];

pub fn default_policies() -> Vec<Policy> {
    LIBRARY.to_vec()
}

pub fn hard_policies() -> impl Iterator<Item = Policy> {
    LIBRARY.into_iter().filter(|p| p.kind == PolicyKind::Hard)
}

/// Look up a library policy by name.
pub fn find(name: &str) -> Option<Policy> {
    LIBRARY.into_iter().find(|p| p.name == name)
}

/// Expand policies against a snapshot.
///
/// Every replica in the snapshot becomes a variable; running replicas are
/// pinned by `do-not-reassign`, so soft objectives see the whole fleet
/// while only pending replicas are free.
pub fn expand(policies: &[Policy], topology: &Topology) -> Problem {
    let mut problem = Problem {
        domain: topology.nodes.keys().copied().collect(),
        variables: replica_vars(topology),
        constraints: Vec::new(),
        objectives: Vec::new(),
    };

    for policy in policies {
        let before = (problem.constraints.len(), problem.objectives.len());
        match policy.scope {
            // Enforced by `Problem::domain`: every candidate node is drawn from it.
            PolicyScope::NodeDomain => {}
            PolicyScope::ReplicaConstraints => affinity(topology, &mut problem.constraints),
            PolicyScope::Range => {
                let mut by_range: BTreeMap<RangeId, Vec<ReplicaId>> = BTreeMap::new();
                for replica in topology.replicas.values() {
                    by_range.entry(replica.range_id).or_default().push(replica.id);
                }
                problem.constraints.extend(by_range.into_iter().map(|(range_id, replicas)| {
                    HardConstraint::AllDifferent { range_id, replicas }
                }));
            }
            PolicyScope::RunningReplicas => {
                problem.constraints.extend(topology.replicas.values().filter_map(|r| {
                    match (r.is_running(), r.current_node) {
                        (true, Some(node_id)) => Some(HardConstraint::Pin {
                            replica_id: r.id,
                            node_id,
                        }),
                        _ => None,
                    }
                }));
            }
            PolicyScope::RangeByLabel(key) => {
                let (members, names) = label_groups(topology, key);
                for term in policy.objectives {
                    problem.objectives.push(Objective {
                        policy: policy.name,
                        grouping: Grouping::PerRange {
                            key: key.to_string(),
                            members: members.clone(),
                            groups: names.len(),
                        },
                        aggregate: term.aggregate,
                        direction: term.direction,
                    });
                }
            }
            PolicyScope::Node => {
                for term in policy.objectives {
                    problem.objectives.push(Objective {
                        policy: policy.name,
                        grouping: Grouping::PerNode,
                        aggregate: term.aggregate,
                        direction: term.direction,
                    });
                }
            }
        }
        debug!(
            policy = policy.name,
            constraints = problem.constraints.len() - before.0,
            objectives = problem.objectives.len() - before.1,
            "expanded policy"
        );
    }
    problem
}

fn affinity(topology: &Topology, out: &mut Vec<HardConstraint>) {
    // Many replicas share the same rule; join each distinct label once.
    let mut cache: BTreeMap<(String, Option<String>), BTreeSet<NodeId>> = BTreeMap::new();
    for (replica_id, rows) in &topology.constraints {
        if !topology.replicas.contains_key(replica_id) {
            continue;
        }
        for row in rows {
            let rule: &ConstraintRule = &row.rule;
            let matching = cache
                .entry((rule.label_key.clone(), rule.label_value.clone()))
                .or_insert_with(|| matching_nodes(topology, rule))
                .clone();
            out.push(HardConstraint::Affinity {
                replica_id: *replica_id,
                rule: rule.clone(),
                matching,
            });
        }
    }
}
