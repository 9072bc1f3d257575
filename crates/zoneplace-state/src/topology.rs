//! Point-in-time snapshot of the whole topology store.
//!
//! A [`Topology`] is read in one redb read transaction, so it always reflects
//! a single committed state. Policy expansion and state reports work on a
//! snapshot instead of holding the store open.

use std::collections::BTreeMap;

use crate::types::*;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    pub nodes: BTreeMap<NodeId, NodeInfo>,
    pub databases: BTreeMap<DatabaseId, DatabaseSpec>,
    pub ranges: BTreeMap<RangeId, RangeInfo>,
    pub replicas: BTreeMap<ReplicaId, ReplicaState>,
    /// Constraint rows per replica, in compiled order.
    pub constraints: BTreeMap<ReplicaId, Vec<ReplicaConstraint>>,
}

impl Topology {
    pub fn database_by_name(&self, name: &str) -> Option<&DatabaseSpec> {
        self.databases.values().find(|db| db.name == name)
    }

    pub fn ranges_for_database(&self, database_id: DatabaseId) -> impl Iterator<Item = &RangeInfo> {
        self.ranges
            .values()
            .filter(move |r| r.database_id == database_id)
    }

    pub fn replicas_for_range(&self, range_id: RangeId) -> impl Iterator<Item = &ReplicaState> {
        self.replicas.values().filter(move |r| r.range_id == range_id)
    }

    /// Replicas of every range of the named database, ordered by (range id, replica id).
    pub fn replicas_for_database(&self, name: &str) -> Vec<&ReplicaState> {
        let Some(db) = self.database_by_name(name) else {
            return Vec::new();
        };
        let mut out: Vec<&ReplicaState> = self
            .ranges_for_database(db.id)
            .flat_map(|range| self.replicas_for_range(range.id))
            .collect();
        out.sort_by_key(|r| (r.range_id, r.id));
        out
    }

    pub fn pending_replicas(&self) -> impl Iterator<Item = &ReplicaState> {
        self.replicas
            .values()
            .filter(|r| r.status == ReplicaStatus::Pending)
    }

    pub fn constraints_for(&self, replica_id: ReplicaId) -> &[ReplicaConstraint] {
        self.constraints
            .get(&replica_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> Topology {
        let mut t = Topology::default();
        for (id, name) in [(1, "a"), (2, "b")] {
            t.databases.insert(
                id,
                DatabaseSpec {
                    id,
                    name: name.to_string(),
                    num_replicas: 2,
                    placement_constraints: String::new(),
                },
            );
        }
        t.ranges.insert(10, RangeInfo { id: 10, database_id: 1 });
        t.ranges.insert(11, RangeInfo { id: 11, database_id: 2 });
        t.ranges.insert(12, RangeInfo { id: 12, database_id: 1 });
        for (id, range) in [(100, 12), (101, 10), (102, 10), (103, 11), (104, 12)] {
            t.replicas.insert(id, ReplicaState::pending(id, range));
        }
        t
    }

    #[test]
    fn replicas_for_database_orders_by_range_then_id() {
        let t = topology();
        let ids: Vec<_> = t.replicas_for_database("a").iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![101, 102, 100, 104]);
    }

    #[test]
    fn unknown_database_has_no_replicas() {
        assert!(topology().replicas_for_database("zzz").is_empty());
    }

    #[test]
    fn missing_constraints_are_empty() {
        assert!(topology().constraints_for(100).is_empty());
    }
}
