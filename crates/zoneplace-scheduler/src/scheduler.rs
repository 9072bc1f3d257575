//! Scheduler: administrative API and incremental placement rounds.
//!
//! The `Scheduler` is the control loop that:
//! - Registers nodes and databases and keeps replica counts in step with
//!   each database's replication factor
//! - Compiles zone configurations before anything is written
//! - Runs placement rounds: snapshot, expand policies, solve, commit
//!
//! Rounds and administrative mutations share one lock, so the pending set
//! never changes under an in-flight round. Reads go straight to the store
//! and see either the state before a round or after its commit.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use zoneplace_core::{PlacementConfig, SolverConfig};
use zoneplace_placement::{
    Assignment, CancelFlag, Policy, PolicyKind, SearchSolver, Solver, compile, default_policies,
    expand, find, hard_policies, parse_label,
};
use zoneplace_state::*;

use crate::error::{SchedulerError, SchedulerResult};
use crate::placement_executor;
use crate::report::StateReport;

/// Replication factor used when `add_database` is not given one.
pub const DEFAULT_NUM_REPLICAS: u32 = 3;

/// Databases created by [`Scheduler::bootstrap`], with their replication factors.
pub const SYSTEM_DATABASES: [(&str, u32); 4] =
    [("meta", 5), ("liveness", 5), ("system", 5), ("timeseries", 1)];

pub struct Scheduler {
    state: StateStore,
    solver: Arc<dyn Solver>,
    /// Hard policies first, then soft ones in priority order.
    policies: Vec<Policy>,
    round_lock: Arc<Mutex<()>>,
    solve_timeout: Option<Duration>,
}

impl Scheduler {
    /// A scheduler with the full policy library and the built-in solver.
    pub fn new(state: StateStore) -> Self {
        Self {
            state,
            solver: Arc::new(SearchSolver::default()),
            policies: default_policies(),
            round_lock: Arc::new(Mutex::new(())),
            solve_timeout: None,
        }
    }

    /// Build from fleet-file sections.
    pub fn from_config(
        state: StateStore,
        solver: &SolverConfig,
        placement: &PlacementConfig,
    ) -> SchedulerResult<Self> {
        let mut scheduler = Self::new(state)
            .with_solver(Arc::new(SearchSolver::new(
                solver.max_steps,
                solver.improvement_passes,
            )))
            .with_soft_policies(placement.objectives.as_slice())?;
        scheduler.solve_timeout = solver.timeout();
        Ok(scheduler)
    }

    pub fn with_solver(mut self, solver: Arc<dyn Solver>) -> Self {
        self.solver = solver;
        self
    }

    /// Keep every hard policy and rank the named soft ones in the given order.
    pub fn with_soft_policies<S: AsRef<str>>(mut self, names: &[S]) -> SchedulerResult<Self> {
        let mut policies: Vec<Policy> = hard_policies().collect();
        for name in names {
            let name = name.as_ref();
            let policy = find(name).ok_or_else(|| SchedulerError::UnknownPolicy(name.to_string()))?;
            if policy.kind == PolicyKind::Soft && !policies.contains(&policy) {
                policies.push(policy);
            }
        }
        self.policies = policies;
        Ok(self)
    }

    pub fn with_solve_timeout(mut self, timeout: Duration) -> Self {
        self.solve_timeout = Some(timeout);
        self
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    // ── Administrative API ─────────────────────────────────────────

    /// Register a node with its locality (`key=value`), capability and
    /// store (`key:value` or bare `key`) labels.
    pub async fn add_node(
        &self,
        id: NodeId,
        locality: &[&str],
        capabilities: &[&str],
        stores: &[&str],
    ) -> SchedulerResult<NodeInfo> {
        let mut labels = Vec::with_capacity(locality.len() + capabilities.len() + stores.len());
        for (kind, list) in [
            (LabelKind::Locality, locality),
            (LabelKind::Capability, capabilities),
            (LabelKind::Store, stores),
        ] {
            for text in list {
                let (key, value) = parse_label(text, kind.separator())
                    .map_err(|_| SchedulerError::InvalidLabel(text.to_string()))?;
                labels.push(NodeLabel { key, value, kind });
            }
        }
        let node = NodeInfo { id, labels };

        let _guard = self.round_lock.lock().await;
        self.state.insert_node(&node).map_err(|e| match e {
            StateError::AlreadyExists(_) => SchedulerError::NodeExists(id),
            other => other.into(),
        })?;
        info!(node = id, labels = node.labels.len(), "node registered");
        Ok(node)
    }

    /// Create a database with one range of pending replicas.
    ///
    /// `num_replicas` defaults to 3 and `constraints` to none.
    pub async fn add_database(
        &self,
        name: &str,
        num_replicas: Option<u32>,
        constraints: Option<&str>,
    ) -> SchedulerResult<DatabaseSpec> {
        let num_replicas = num_replicas.unwrap_or(DEFAULT_NUM_REPLICAS);
        let constraints = constraints.unwrap_or_default();
        let slots = compile(num_replicas, constraints)?;

        let _guard = self.round_lock.lock().await;
        let spec = self
            .state
            .create_database(name, num_replicas, constraints, &slots)
            .map_err(|e| match e {
                StateError::AlreadyExists(_) => SchedulerError::DatabaseExists(name.to_string()),
                other => other.into(),
            })?;
        info!(database = %name, num_replicas, "database added");
        Ok(spec)
    }

    /// Raise a database's replication factor and replace its constraints.
    ///
    /// Running replicas keep their nodes; if they now violate the new
    /// constraints the next round reports `InfeasiblePlacement`.
    pub async fn edit_database(
        &self,
        name: &str,
        num_replicas: u32,
        constraints: &str,
    ) -> SchedulerResult<DatabaseSpec> {
        let _guard = self.round_lock.lock().await;
        let current = self
            .state
            .get_database(name)?
            .ok_or_else(|| SchedulerError::UnknownDatabase(name.to_string()))?;
        if num_replicas < current.num_replicas {
            return Err(SchedulerError::ReplicationFactorDecrease {
                database: name.to_string(),
                current: current.num_replicas,
                requested: num_replicas,
            });
        }
        let slots = compile(num_replicas, constraints)?;
        let spec = self
            .state
            .update_database(current.id, num_replicas, constraints, &slots)?;
        info!(
            database = %name,
            from = current.num_replicas,
            to = num_replicas,
            "database edited"
        );
        Ok(spec)
    }

    /// Add another range to a database, constrained like its existing ones.
    pub async fn add_range(&self, name: &str) -> SchedulerResult<RangeInfo> {
        let _guard = self.round_lock.lock().await;
        let db = self
            .state
            .get_database(name)?
            .ok_or_else(|| SchedulerError::UnknownDatabase(name.to_string()))?;
        let slots = compile(db.num_replicas, &db.placement_constraints)?;
        let range = self.state.add_range(db.id, &slots)?;
        info!(database = %name, range = range.id, "range added");
        Ok(range)
    }

    /// Run one placement round and return the nodes chosen for the
    /// previously pending replicas.
    ///
    /// On any error the store is left exactly as it was.
    pub async fn place_replicas(&self) -> SchedulerResult<Assignment> {
        let _guard = self.round_lock.lock().await;

        let topology = self.state.snapshot()?;
        let pending = topology.pending_replicas().count();
        info!(
            pending,
            replicas = topology.replicas.len(),
            nodes = topology.nodes.len(),
            "placement round started"
        );

        let problem = expand(&self.policies, &topology);
        debug!(
            variables = problem.variables.len(),
            constraints = problem.constraints.len(),
            objectives = problem.objectives.len(),
            "placement problem built"
        );

        let solver = Arc::clone(&self.solver);
        let cancel = CancelFlag::new();
        let mut task = tokio::task::spawn_blocking({
            let cancel = cancel.clone();
            move || solver.solve(&problem, &cancel)
        });

        let joined = match self.solve_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    cancel.cancel();
                    warn!(timeout = ?limit, "placement round timed out");
                    // Hold the round lock until the solver has seen the flag.
                    let _ = task.await;
                    return Err(SchedulerError::RoundTimedOut(limit));
                }
            },
            None => task.await,
        };
        let assignment = joined
            .map_err(|e| SchedulerError::Task(e.to_string()))?
            .map_err(|e| {
                warn!(error = %e, "placement round failed");
                SchedulerError::from(e)
            })?;

        let result = placement_executor::execute(&assignment, &self.state)?;
        info!(placed = result.committed, "placement round committed");
        Ok(assignment)
    }

    /// Create whichever system databases are missing, then place replicas.
    pub async fn bootstrap(&self) -> SchedulerResult<Assignment> {
        for (name, num_replicas) in SYSTEM_DATABASES {
            if self.state.get_database(name)?.is_some() {
                debug!(database = name, "system database already present");
                continue;
            }
            match self.add_database(name, Some(num_replicas), None).await {
                Ok(_) | Err(SchedulerError::DatabaseExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        self.place_replicas().await
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Every replica in id order.
    pub fn replica_state(&self) -> SchedulerResult<Vec<ReplicaState>> {
        Ok(self.state.list_replicas()?)
    }

    /// Replicas of one database, ordered by (range id, replica id).
    pub fn replicas_for_database(&self, name: &str) -> SchedulerResult<Vec<ReplicaState>> {
        let topology = self.state.snapshot()?;
        if topology.database_by_name(name).is_none() {
            return Err(SchedulerError::UnknownDatabase(name.to_string()));
        }
        Ok(topology
            .replicas_for_database(name)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Text dump of the whole store plus derived placement views.
    pub fn render_state(&self) -> SchedulerResult<String> {
        let topology = self.state.snapshot()?;
        Ok(StateReport(&topology).to_string())
    }
}
