pub mod config;

pub use config::{
    DEFAULT_IMPROVEMENT_PASSES, DEFAULT_MAX_STEPS, DatabaseConfig, FleetConfig, NodeConfig,
    PlacementConfig, SolverConfig,
};
