//! Domain types for the topology store.
//!
//! These types represent the persisted fleet (nodes and their labels) and
//! the replicated data layout (databases, ranges, replicas, per-replica
//! constraints). All types are serializable to/from JSON for storage in
//! redb tables.

use serde::{Deserialize, Serialize};

/// Caller-assigned identifier of a node in the fleet.
pub type NodeId = u64;

/// Store-assigned identifier of a database.
pub type DatabaseId = u64;

/// Store-assigned identifier of a range.
pub type RangeId = u64;

/// Store-assigned identifier of a replica.
pub type ReplicaId = u64;

// ── Nodes ──────────────────────────────────────────────────────────

/// Which registration list a label came from.
///
/// Locality labels are written `key=value`; capability and store labels are
/// written `key:value` (or a bare `key` for boolean attributes).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    Locality,
    Capability,
    Store,
}

impl LabelKind {
    /// Separator between key and value for this kind of label.
    pub fn separator(self) -> char {
        match self {
            LabelKind::Locality => '=',
            LabelKind::Capability | LabelKind::Store => ':',
        }
    }
}

/// A `(key, value)` attribute attached to a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeLabel {
    pub key: String,
    /// Absent for boolean capability labels such as `ssd`.
    pub value: Option<String>,
    pub kind: LabelKind,
}

/// A node and the labels it was registered with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub labels: Vec<NodeLabel>,
}

impl NodeInfo {
    /// Whether this node carries a label matching `key` and, when given, `value`.
    ///
    /// A `None` value matches any label with that key.
    pub fn has_label(&self, key: &str, value: Option<&str>) -> bool {
        self.labels.iter().any(|l| {
            l.key == key
                && match value {
                    None => true,
                    Some(v) => l.value.as_deref() == Some(v),
                }
        })
    }

    /// All values of a (possibly multi-valued) key. Key-only labels are skipped.
    pub fn label_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.labels
            .iter()
            .filter(move |l| l.key == key)
            .filter_map(|l| l.value.as_deref())
    }
}

// ── Databases and ranges ───────────────────────────────────────────

/// A logical database and its zone configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseSpec {
    pub id: DatabaseId,
    pub name: String,
    /// Target replication factor for every range of this database.
    pub num_replicas: u32,
    /// Raw constraint scope JSON as supplied by the operator.
    pub placement_constraints: String,
}

/// A shard of a database's keyspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RangeInfo {
    pub id: RangeId,
    pub database_id: DatabaseId,
}

// ── Replicas ───────────────────────────────────────────────────────

/// Replica lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaStatus {
    /// Waiting for a placement round to choose a node.
    Pending,
    /// Committed to `current_node`; pinned there by later rounds.
    Running,
}

impl std::fmt::Display for ReplicaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicaStatus::Pending => write!(f, "pending"),
            ReplicaStatus::Running => write!(f, "running"),
        }
    }
}

/// One copy of a range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaState {
    pub id: ReplicaId,
    pub range_id: RangeId,
    pub status: ReplicaStatus,
    /// Node actually serving the replica. `None` until first placement.
    pub current_node: Option<NodeId>,
    /// The decision variable filled in by the solver. Equals `current_node`
    /// once committed.
    pub controllable_node: Option<NodeId>,
}

impl ReplicaState {
    /// A freshly created replica awaiting placement.
    pub fn pending(id: ReplicaId, range_id: RangeId) -> Self {
        Self {
            id,
            range_id,
            status: ReplicaStatus::Pending,
            current_node: None,
            controllable_node: None,
        }
    }

    /// Running iff a node is committed and it matches the decision variable.
    pub fn is_running(&self) -> bool {
        self.status == ReplicaStatus::Running
            && self.current_node.is_some()
            && self.current_node == self.controllable_node
    }
}

// ── Constraints ────────────────────────────────────────────────────

/// Whether a constraint requires or prohibits a label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    Required,
    Prohibited,
}

impl std::fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintType::Required => write!(f, "required"),
            ConstraintType::Prohibited => write!(f, "prohibited"),
        }
    }
}

/// A constraint not yet bound to a replica. Output of the constraint compiler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConstraintRule {
    pub constraint_type: ConstraintType,
    pub label_key: String,
    /// `None` matches any value of `label_key`.
    pub label_value: Option<String>,
}

impl ConstraintRule {
    /// Whether placing on `node` satisfies this rule.
    pub fn is_satisfied_by(&self, node: &NodeInfo) -> bool {
        let matched = node.has_label(&self.label_key, self.label_value.as_deref());
        match self.constraint_type {
            ConstraintType::Required => matched,
            ConstraintType::Prohibited => !matched,
        }
    }

    /// Bind this rule to a concrete replica.
    pub fn bind(&self, replica_id: ReplicaId, range_id: RangeId) -> ReplicaConstraint {
        ReplicaConstraint {
            replica_id,
            range_id,
            rule: self.clone(),
        }
    }
}

impl std::fmt::Display for ConstraintRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = match self.constraint_type {
            ConstraintType::Required => '+',
            ConstraintType::Prohibited => '-',
        };
        match &self.label_value {
            Some(v) => write!(f, "{sign}{}={v}", self.label_key),
            None => write!(f, "{sign}{}", self.label_key),
        }
    }
}

/// A persisted constraint row. `range_id` is denormalized for grouping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaConstraint {
    pub replica_id: ReplicaId,
    pub range_id: RangeId,
    #[serde(flatten)]
    pub rule: ConstraintRule,
}
