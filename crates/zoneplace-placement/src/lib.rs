//! zoneplace placement: constraint compiler, policy library, solver.
//!
//! This crate turns a topology snapshot plus zone-configuration strings into
//! a typed placement problem, and solves it. It does NOT touch the store
//! (that's `zoneplace-scheduler`); every function here is pure over its
//! inputs and deterministic.
//!
//! # Components
//!
//! - **`scope`**: Zone-configuration JSON decoding (uniform vs. per-group scope, selectors)
//! - **`compiler`**: Scope → per-replica constraint rules
//! - **`convert`**: Node/label joins over a `Topology` snapshot
//! - **`policy`**: The policy library and its expansion into a `Problem`
//! - **`problem`**: Decision variables, hard constraints, soft objectives
//! - **`objective`**: Lexicographic scoring of (partial) assignments
//! - **`solver`**: The `Solver` boundary and the built-in search solver

pub mod compiler;
pub mod convert;
pub mod error;
pub mod objective;
pub mod policy;
pub mod problem;
pub mod scope;
pub mod solver;

pub use compiler::{MAX_NUM_REPLICAS, compile, compile_scope};
pub use convert::{label_groups, matching_nodes, replica_vars};
pub use error::{CompileError, SolveError};
pub use objective::{Evaluator, Score};
pub use policy::{LIBRARY, ObjectiveTerm, Policy, PolicyKind, PolicyScope, default_policies, expand, find, hard_policies};
pub use problem::{Aggregate, Assignment, Direction, Grouping, HardConstraint, Objective, Problem, ReplicaVar};
pub use scope::{ScopeSpec, Selector, parse_label};
pub use solver::{CancelFlag, SearchSolver, Solver};
