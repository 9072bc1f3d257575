//! Fleet file (`zoneplace.toml`) parser.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Solver defaults, shared by `[solver]` and `SearchSolver::default()`.
pub const DEFAULT_MAX_STEPS: u64 = 200_000;
pub const DEFAULT_IMPROVEMENT_PASSES: u32 = 64;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FleetConfig {
    /// Create the system databases before the first round.
    pub bootstrap: bool,
    pub solver: SolverConfig,
    pub placement: PlacementConfig,
    pub nodes: Vec<NodeConfig>,
    pub databases: Vec<DatabaseConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SolverConfig {
    pub max_steps: u64,
    pub improvement_passes: u32,
    pub timeout_ms: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            improvement_passes: DEFAULT_IMPROVEMENT_PASSES,
            timeout_ms: None,
        }
    }
}

impl SolverConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Soft policies to rank, highest priority first. Hard policies always apply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlacementConfig {
    pub objectives: Vec<String>,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            objectives: ["spread-across-region", "spread-across-az", "use-more-nodes"]
                .map(String::from)
                .to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfig {
    pub id: u64,
    /// `key=value` pairs.
    #[serde(default)]
    pub locality: Vec<String>,
    /// `key:value` pairs or bare keys.
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub stores: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub name: String,
    pub num_replicas: Option<u32>,
    /// Raw zone-configuration JSON.
    pub constraints: Option<String>,
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: FleetConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
