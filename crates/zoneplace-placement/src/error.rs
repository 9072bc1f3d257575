//! Compiler and solver error types.

use thiserror::Error;

/// A zone-configuration string that cannot be compiled.
///
/// Every variant is reported to the caller before anything is written.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("malformed constraint JSON: {0}")]
    MalformedJson(String),

    #[error("unsupported constraint scope: {0}")]
    UnsupportedShape(String),

    #[error("malformed selector {0:?}")]
    MalformedSelector(String),

    #[error("{constrained} replicas constrained but the zone only has {num_replicas}")]
    OverSubscribed { constrained: u64, num_replicas: u32 },

    #[error("replication factor must be at least 1")]
    ZeroReplicas,

    #[error("replication factor {0} exceeds the limit of {max}", max = crate::compiler::MAX_NUM_REPLICAS)]
    TooManyReplicas(u32),
}

/// Why a solver produced no assignment.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SolveError {
    #[error("infeasible: {0}")]
    Infeasible(String),

    #[error("solve cancelled")]
    Cancelled,

    #[error("search budget of {0} steps exhausted")]
    Exhausted(u64),
}
