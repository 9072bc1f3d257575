//! zoneplace-scheduler: administrative API and placement rounds.
//!
//! Registers nodes and databases in the topology store (`zoneplace-state`),
//! compiles zone configurations and expands the policy library
//! (`zoneplace-placement`), and runs incremental placement rounds:
//!
//! - Only pending replicas are free; running replicas are pinned
//! - A round's solve runs on the blocking pool and can time out
//! - A successful round commits every assignment in one transaction
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── round lock (admin mutations and rounds are serialized)
//!   ├── StateStore (snapshot in, assignment out)
//!   ├── Policy list (hard library policies + configured soft ones)
//!   └── dyn Solver (built-in SearchSolver by default)
//! ```

pub mod error;
pub mod placement_executor;
pub mod report;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use report::StateReport;
pub use scheduler::{DEFAULT_NUM_REPLICAS, SYSTEM_DATABASES, Scheduler};
