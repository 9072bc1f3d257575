//! redb table definitions for the topology store.
//!
//! Entity tables use `u64` id keys and `&[u8]` values (JSON-serialized
//! domain types). Iteration order is ascending id, which is also creation
//! order since ids are allocated monotonically.

use redb::TableDefinition;

/// Nodes (with their labels) keyed by node id.
pub const NODES: TableDefinition<u64, &[u8]> = TableDefinition::new("nodes");

/// Database specs keyed by database id.
pub const DATABASES: TableDefinition<u64, &[u8]> = TableDefinition::new("databases");

/// Unique index: database name → database id.
pub const DATABASE_NAMES: TableDefinition<&str, u64> = TableDefinition::new("database_names");

/// Ranges keyed by range id.
pub const RANGES: TableDefinition<u64, &[u8]> = TableDefinition::new("ranges");

/// Replica state keyed by replica id.
pub const REPLICAS: TableDefinition<u64, &[u8]> = TableDefinition::new("replicas");

/// Constraint rows of one replica, keyed by replica id.
pub const REPLICA_CONSTRAINTS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("replica_constraints");

/// Last allocated id per sequence name (`database`, `range`, `replica`).
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

pub const SEQ_DATABASE: &str = "database";
pub const SEQ_RANGE: &str = "range";
pub const SEQ_REPLICA: &str = "replica";
