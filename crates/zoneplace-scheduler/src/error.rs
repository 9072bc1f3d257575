//! Scheduler error types.

use std::time::Duration;

use thiserror::Error;
use zoneplace_placement::{CompileError, SolveError};
use zoneplace_state::NodeId;

/// Errors returned by administrative calls and placement rounds.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid constraint spec: {0}")]
    InvalidConstraintSpec(CompileError),

    #[error("invalid label {0:?}")]
    InvalidLabel(String),

    #[error("invalid replication factor {0}")]
    InvalidReplicationFactor(u32),

    #[error("unknown database: {0}")]
    UnknownDatabase(String),

    #[error("database already exists: {0}")]
    DatabaseExists(String),

    #[error("node already registered: {0}")]
    NodeExists(NodeId),

    #[error("database {database} has {current} replicas per range, cannot decrease to {requested}")]
    ReplicationFactorDecrease {
        database: String,
        current: u32,
        requested: u32,
    },

    #[error("infeasible placement: {0}")]
    InfeasiblePlacement(String),

    #[error("solver gave up after {0} steps")]
    SolverExhausted(u64),

    #[error("placement round timed out after {0:?}")]
    RoundTimedOut(Duration),

    #[error("placement round cancelled")]
    RoundCancelled,

    #[error("unknown placement policy: {0}")]
    UnknownPolicy(String),

    #[error("state store error: {0}")]
    State(#[from] zoneplace_state::StateError),

    #[error("solver task failed: {0}")]
    Task(String),
}

impl From<CompileError> for SchedulerError {
    fn from(err: CompileError) -> Self {
        match err {
            CompileError::ZeroReplicas => SchedulerError::InvalidReplicationFactor(0),
            CompileError::TooManyReplicas(n) => SchedulerError::InvalidReplicationFactor(n),
            other => SchedulerError::InvalidConstraintSpec(other),
        }
    }
}

impl From<SolveError> for SchedulerError {
    fn from(err: SolveError) -> Self {
        match err {
            SolveError::Infeasible(reason) => SchedulerError::InfeasiblePlacement(reason),
            SolveError::Cancelled => SchedulerError::RoundCancelled,
            SolveError::Exhausted(steps) => SchedulerError::SolverExhausted(steps),
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
