//! StateStore: redb-backed topology persistence.
//!
//! Provides typed operations over nodes, databases, ranges, replicas and
//! replica constraints. All values are JSON-serialized into redb's `&[u8]`
//! value columns. The store supports both on-disk and in-memory backends
//! (the latter for testing).
//!
//! Every mutation that touches more than one row runs in a single write
//! transaction: either all of its rows become visible or none do.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, Table, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::topology::Topology;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe topology store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        WriteTables::open(&txn)?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Register a node. Node ids are caller-assigned and must be unique.
    pub fn insert_node(&self, node: &NodeInfo) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut tables = WriteTables::open(&txn)?;
            if tables.nodes.get(node.id).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(format!("node {}", node.id)));
            }
            put_json(&mut tables.nodes, node.id, node)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node = node.id, labels = node.labels.len(), "node stored");
        Ok(())
    }

    /// Get a node by id.
    pub fn get_node(&self, node_id: NodeId) -> StateResult<Option<NodeInfo>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        get_json(&table, node_id)
    }

    /// List all nodes in id order.
    pub fn list_nodes(&self) -> StateResult<Vec<NodeInfo>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        scan_json(&table)
    }

    // ── Databases ──────────────────────────────────────────────────

    /// Create a database with a single range of `num_replicas` pending replicas.
    ///
    /// `slots[i]` holds the constraint rules of the i-th replica of the
    /// range; replicas without a slot are unconstrained.
    pub fn create_database(
        &self,
        name: &str,
        num_replicas: u32,
        placement_constraints: &str,
        slots: &[Vec<ConstraintRule>],
    ) -> StateResult<DatabaseSpec> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let spec;
        {
            let mut tables = WriteTables::open(&txn)?;
            if tables.names.get(name).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(format!("database {name}")));
            }
            let id = tables.next_id(SEQ_DATABASE)?;
            spec = DatabaseSpec {
                id,
                name: name.to_string(),
                num_replicas,
                placement_constraints: placement_constraints.to_string(),
            };
            put_json(&mut tables.databases, id, &spec)?;
            tables.names.insert(name, id).map_err(map_err!(Write))?;
            tables.add_range(&spec, slots)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(database = %spec.name, id = spec.id, num_replicas, "database stored");
        Ok(spec)
    }

    /// Get a database by its unique name.
    pub fn get_database(&self, name: &str) -> StateResult<Option<DatabaseSpec>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let names = txn.open_table(DATABASE_NAMES).map_err(map_err!(Table))?;
        let Some(id) = names.get(name).map_err(map_err!(Read))?.map(|g| g.value()) else {
            return Ok(None);
        };
        let table = txn.open_table(DATABASES).map_err(map_err!(Table))?;
        get_json(&table, id)
    }

    /// List all databases in creation order.
    pub fn list_databases(&self) -> StateResult<Vec<DatabaseSpec>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DATABASES).map_err(map_err!(Table))?;
        scan_json(&table)
    }

    /// Add another range to a database, populated like the first one.
    pub fn add_range(
        &self,
        database_id: DatabaseId,
        slots: &[Vec<ConstraintRule>],
    ) -> StateResult<RangeInfo> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let range;
        {
            let mut tables = WriteTables::open(&txn)?;
            let spec: DatabaseSpec = get_json(&tables.databases, database_id)?
                .ok_or_else(|| StateError::NotFound(format!("database id {database_id}")))?;
            range = tables.add_range(&spec, slots)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(database_id, range = range.id, "range stored");
        Ok(range)
    }

    /// Raise a database's replication factor and/or replace its constraints.
    ///
    /// New pending replicas are appended to every range until each holds
    /// `num_replicas`. The constraint rows of every replica (old and new) are
    /// rewritten from `slots`, matching slots to replicas in id order.
    /// Existing replica placements are left untouched.
    pub fn update_database(
        &self,
        database_id: DatabaseId,
        num_replicas: u32,
        placement_constraints: &str,
        slots: &[Vec<ConstraintRule>],
    ) -> StateResult<DatabaseSpec> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut spec: DatabaseSpec;
        let mut added = 0usize;
        {
            let mut tables = WriteTables::open(&txn)?;
            spec = get_json(&tables.databases, database_id)?
                .ok_or_else(|| StateError::NotFound(format!("database id {database_id}")))?;
            if num_replicas < spec.num_replicas {
                return Err(StateError::Conflict(format!(
                    "database {} cannot shrink from {} to {num_replicas} replicas",
                    spec.name, spec.num_replicas
                )));
            }
            spec.num_replicas = num_replicas;
            spec.placement_constraints = placement_constraints.to_string();
            put_json(&mut tables.databases, database_id, &spec)?;

            let ranges: Vec<RangeInfo> = scan_json(&tables.ranges)?;
            let replicas: Vec<ReplicaState> = scan_json(&tables.replicas)?;
            for range in ranges.iter().filter(|r| r.database_id == database_id) {
                let mut ids: Vec<ReplicaId> = replicas
                    .iter()
                    .filter(|r| r.range_id == range.id)
                    .map(|r| r.id)
                    .collect();
                while ids.len() < num_replicas as usize {
                    ids.push(tables.add_replica(range.id)?);
                    added += 1;
                }
                for (slot, replica_id) in ids.iter().enumerate() {
                    let rules = slots.get(slot).map(Vec::as_slice).unwrap_or(&[]);
                    tables.set_constraints(*replica_id, range.id, rules)?;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(database = %spec.name, num_replicas, added, "database updated");
        Ok(spec)
    }

    // ── Replicas ───────────────────────────────────────────────────

    /// List all replicas in id order.
    pub fn list_replicas(&self) -> StateResult<Vec<ReplicaState>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(REPLICAS).map_err(map_err!(Table))?;
        scan_json(&table)
    }

    /// Commit a placement: every listed replica becomes `running` on its node.
    ///
    /// All replicas are updated in one transaction. If any replica is unknown,
    /// no longer pending, or assigned to an unregistered node, nothing is
    /// written. Returns the number of replicas committed.
    pub fn commit_assignment(&self, assignment: &BTreeMap<ReplicaId, NodeId>) -> StateResult<usize> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut tables = WriteTables::open(&txn)?;
            for (&replica_id, &node_id) in assignment {
                if tables.nodes.get(node_id).map_err(map_err!(Read))?.is_none() {
                    return Err(StateError::NotFound(format!("node {node_id}")));
                }
                let mut replica: ReplicaState = get_json(&tables.replicas, replica_id)?
                    .ok_or_else(|| StateError::NotFound(format!("replica {replica_id}")))?;
                if replica.status != ReplicaStatus::Pending {
                    return Err(StateError::Conflict(format!(
                        "replica {replica_id} is already {}",
                        replica.status
                    )));
                }
                replica.controllable_node = Some(node_id);
                replica.current_node = Some(node_id);
                replica.status = ReplicaStatus::Running;
                put_json(&mut tables.replicas, replica_id, &replica)?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(replicas = assignment.len(), "assignment committed");
        Ok(assignment.len())
    }

    // ── Snapshots ──────────────────────────────────────────────────

    /// Read the entire topology in one read transaction.
    pub fn snapshot(&self) -> StateResult<Topology> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let nodes: Vec<NodeInfo> =
            scan_json(&txn.open_table(NODES).map_err(map_err!(Table))?)?;
        let databases: Vec<DatabaseSpec> =
            scan_json(&txn.open_table(DATABASES).map_err(map_err!(Table))?)?;
        let ranges: Vec<RangeInfo> =
            scan_json(&txn.open_table(RANGES).map_err(map_err!(Table))?)?;
        let replicas: Vec<ReplicaState> =
            scan_json(&txn.open_table(REPLICAS).map_err(map_err!(Table))?)?;
        let constraints: Vec<Vec<ReplicaConstraint>> =
            scan_json(&txn.open_table(REPLICA_CONSTRAINTS).map_err(map_err!(Table))?)?;

        Ok(Topology {
            nodes: nodes.into_iter().map(|n| (n.id, n)).collect(),
            databases: databases.into_iter().map(|d| (d.id, d)).collect(),
            ranges: ranges.into_iter().map(|r| (r.id, r)).collect(),
            replicas: replicas.into_iter().map(|r| (r.id, r)).collect(),
            constraints: constraints
                .into_iter()
                .filter_map(|rows| rows.first().map(|c| c.replica_id).map(|id| (id, rows)))
                .collect(),
        })
    }
}

/// Every table opened inside one write transaction.
struct WriteTables<'txn> {
    sequences: Table<'txn, &'static str, u64>,
    nodes: Table<'txn, u64, &'static [u8]>,
    databases: Table<'txn, u64, &'static [u8]>,
    names: Table<'txn, &'static str, u64>,
    ranges: Table<'txn, u64, &'static [u8]>,
    replicas: Table<'txn, u64, &'static [u8]>,
    constraints: Table<'txn, u64, &'static [u8]>,
}

impl<'txn> WriteTables<'txn> {
    fn open(txn: &'txn WriteTransaction) -> StateResult<Self> {
        Ok(Self {
            sequences: txn.open_table(SEQUENCES).map_err(map_err!(Table))?,
            nodes: txn.open_table(NODES).map_err(map_err!(Table))?,
            databases: txn.open_table(DATABASES).map_err(map_err!(Table))?,
            names: txn.open_table(DATABASE_NAMES).map_err(map_err!(Table))?,
            ranges: txn.open_table(RANGES).map_err(map_err!(Table))?,
            replicas: txn.open_table(REPLICAS).map_err(map_err!(Table))?,
            constraints: txn.open_table(REPLICA_CONSTRAINTS).map_err(map_err!(Table))?,
        })
    }

    /// Allocate the next id of a sequence. Ids start at 1.
    fn next_id(&mut self, sequence: &str) -> StateResult<u64> {
        let last = self
            .sequences
            .get(sequence)
            .map_err(map_err!(Read))?
            .map(|g| g.value())
            .unwrap_or(0);
        let next = last + 1;
        self.sequences
            .insert(sequence, next)
            .map_err(map_err!(Write))?;
        Ok(next)
    }

    fn add_range(&mut self, db: &DatabaseSpec, slots: &[Vec<ConstraintRule>]) -> StateResult<RangeInfo> {
        let range = RangeInfo {
            id: self.next_id(SEQ_RANGE)?,
            database_id: db.id,
        };
        put_json(&mut self.ranges, range.id, &range)?;
        for slot in 0..db.num_replicas as usize {
            let replica_id = self.add_replica(range.id)?;
            let rules = slots.get(slot).map(Vec::as_slice).unwrap_or(&[]);
            self.set_constraints(replica_id, range.id, rules)?;
        }
        Ok(range)
    }

    fn add_replica(&mut self, range_id: RangeId) -> StateResult<ReplicaId> {
        let id = self.next_id(SEQ_REPLICA)?;
        put_json(&mut self.replicas, id, &ReplicaState::pending(id, range_id))?;
        Ok(id)
    }

    /// Replace the constraint rows of a replica. An empty rule list removes them.
    fn set_constraints(
        &mut self,
        replica_id: ReplicaId,
        range_id: RangeId,
        rules: &[ConstraintRule],
    ) -> StateResult<()> {
        if rules.is_empty() {
            self.constraints
                .remove(replica_id)
                .map_err(map_err!(Write))?;
            return Ok(());
        }
        let rows: Vec<ReplicaConstraint> =
            rules.iter().map(|r| r.bind(replica_id, range_id)).collect();
        put_json(&mut self.constraints, replica_id, &rows)
    }
}

fn put_json<T: Serialize>(
    table: &mut Table<'_, u64, &'static [u8]>,
    id: u64,
    value: &T,
) -> StateResult<()> {
    let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
    table
        .insert(id, bytes.as_slice())
        .map_err(map_err!(Write))?;
    Ok(())
}

fn get_json<T: DeserializeOwned>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> StateResult<Option<T>> {
    match table.get(id).map_err(map_err!(Read))? {
        Some(guard) => {
            let value = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

fn scan_json<T: DeserializeOwned>(
    table: &impl ReadableTable<u64, &'static [u8]>,
) -> StateResult<Vec<T>> {
    let mut results = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (_, value) = entry.map_err(map_err!(Read))?;
        results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
    }
    Ok(results)
}
