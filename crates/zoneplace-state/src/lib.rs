//! zoneplace-state: topology store for replica placement.
//!
//! Backed by [redb](https://docs.rs/redb), holds the node fleet, databases,
//! ranges, replicas and per-replica placement constraints.
//!
//! # Architecture
//!
//! Records are JSON-serialized into redb's `&[u8]` value columns and keyed
//! by their integer id. Surrogate ids come from the `sequences` table and are
//! allocated inside the same write transaction that inserts the row, so a
//! failed mutation never burns or leaks an id.
//!
//! Multi-row mutations (creating a database, editing its replication
//! factor, committing a placement round) each run in a single write
//! transaction. Readers take a [`Topology`] snapshot in one read transaction
//! and therefore only ever observe committed state.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod topology;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use topology::Topology;
pub use types::*;
