//! Joins between topology snapshot records and placement types.
//!
//! Bridges `zoneplace_state::{NodeInfo, ReplicaState, ConstraintRule}` to the
//! problem's node sets, label groups, and decision variables.

use std::collections::{BTreeMap, BTreeSet};

use zoneplace_state::{ConstraintRule, NodeId, Topology};

use crate::problem::ReplicaVar;

/// Nodes carrying the label a rule refers to.
///
/// This is the label match only; whether the replica must land inside or
/// outside the set is the rule's `constraint_type`.
pub fn matching_nodes(topology: &Topology, rule: &ConstraintRule) -> BTreeSet<NodeId> {
    topology
        .nodes
        .values()
        .filter(|n| n.has_label(&rule.label_key, rule.label_value.as_deref()))
        .map(|n| n.id)
        .collect()
}

/// Bucket nodes by the values of `key`.
///
/// Returns each node's bucket indexes and the bucket names in sorted order.
/// A node with several values for the key belongs to several buckets; a node
/// without the key belongs to none.
pub fn label_groups(topology: &Topology, key: &str) -> (BTreeMap<NodeId, Vec<usize>>, Vec<String>) {
    let names: Vec<String> = topology
        .nodes
        .values()
        .flat_map(|n| n.label_values(key))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut members = BTreeMap::new();
    for node in topology.nodes.values() {
        let mut buckets: Vec<usize> = node
            .label_values(key)
            .filter_map(|v| names.binary_search_by(|n| n.as_str().cmp(v)).ok())
            .collect();
        buckets.sort_unstable();
        buckets.dedup();
        if !buckets.is_empty() {
            members.insert(node.id, buckets);
        }
    }
    (members, names)
}

/// One variable per replica in the snapshot, in replica-id order.
pub fn replica_vars(topology: &Topology) -> Vec<ReplicaVar> {
    topology
        .replicas
        .values()
        .map(|r| ReplicaVar {
            replica_id: r.id,
            range_id: r.range_id,
        })
        .collect()
}
