//! The solver boundary and the built-in search solver.
//!
//! A [`Solver`] receives a fully expanded [`Problem`] and either returns a
//! node for every free (unpinned) replica or explains why it can't.
//!
//! [`SearchSolver`] works in three phases:
//! 1. Propagation: per-replica candidate sets from the domain and affinity
//!    rules, pinned nodes checked against them and removed from range peers.
//! 2. Backtracking search: most-constrained replica first, candidate nodes
//!    ordered by the objective score they would yield.
//! 3. Local improvement: single-replica moves, then pairwise swaps, kept
//!    only when the score strictly improves.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;
use zoneplace_core::{DEFAULT_IMPROVEMENT_PASSES, DEFAULT_MAX_STEPS};
use zoneplace_state::{ConstraintType, NodeId, ReplicaId};

use crate::error::SolveError;
use crate::objective::{Evaluator, Score};
use crate::problem::{Assignment, HardConstraint, Problem, ReplicaVar};

/// Cooperative cancellation shared between a round and its solver.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub trait Solver: Send + Sync {
    /// Assign every free variable of `problem`.
    ///
    /// Implementations must honour all hard constraints, return only
    /// unpinned replicas, and give up with [`SolveError::Cancelled`] soon
    /// after `cancel` is set.
    fn solve(&self, problem: &Problem, cancel: &CancelFlag) -> Result<Assignment, SolveError>;
}

/// Deterministic backtracking search with lexicographic local improvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSolver {
    /// Node assignments tried before giving up with `Exhausted`.
    pub max_steps: u64,
    pub improvement_passes: u32,
}

impl Default for SearchSolver {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            improvement_passes: DEFAULT_IMPROVEMENT_PASSES,
        }
    }
}

impl Solver for SearchSolver {
    fn solve(&self, problem: &Problem, cancel: &CancelFlag) -> Result<Assignment, SolveError> {
        let prepared = Prepared::new(problem)?;
        debug!(
            free = prepared.free.len(),
            pinned = prepared.pinned.len(),
            nodes = problem.domain.len(),
            objectives = problem.objectives.len(),
            "solving placement problem"
        );

        let evaluator = Evaluator::new(problem);
        let mut placed = prepared.pinned.clone();
        let mut steps = 0u64;
        if !self.search(&prepared, &evaluator, &mut placed, &mut steps, cancel)? {
            return Err(SolveError::Infeasible(
                "no assignment satisfies every hard constraint".to_string(),
            ));
        }
        debug!(steps, score = ?evaluator.score(&placed).0, "found feasible placement");

        let passes = self.improve(&prepared, &evaluator, &mut placed, cancel)?;
        debug!(passes, score = ?evaluator.score(&placed).0, "local improvement finished");

        Ok(prepared
            .free
            .iter()
            .filter_map(|v| placed.get(&v.replica_id).map(|n| (v.replica_id, *n)))
            .collect())
    }
}

impl SearchSolver {
    pub fn new(max_steps: u64, improvement_passes: u32) -> Self {
        Self {
            max_steps,
            improvement_passes,
        }
    }

    fn search(
        &self,
        prepared: &Prepared,
        evaluator: &Evaluator<'_>,
        placed: &mut BTreeMap<ReplicaId, NodeId>,
        steps: &mut u64,
        cancel: &CancelFlag,
    ) -> Result<bool, SolveError> {
        // Most constrained unplaced replica; ties go to the lowest id.
        let mut next: Option<(ReplicaId, Vec<NodeId>)> = None;
        for var in &prepared.free {
            if placed.contains_key(&var.replica_id) {
                continue;
            }
            let values = prepared.available(var.replica_id, placed);
            if values.is_empty() {
                return Ok(false);
            }
            if next.as_ref().is_none_or(|(_, best)| values.len() < best.len()) {
                next = Some((var.replica_id, values));
            }
        }
        let Some((replica, values)) = next else {
            return Ok(true);
        };

        let mut ordered: Vec<(Score, NodeId)> = values
            .into_iter()
            .map(|node| {
                placed.insert(replica, node);
                let score = evaluator.score(placed);
                placed.remove(&replica);
                (score, node)
            })
            .collect();
        ordered.sort_by(|(sa, na), (sb, nb)| sb.cmp(sa).then(na.cmp(nb)));

        for (_, node) in ordered {
            *steps += 1;
            if *steps > self.max_steps {
                return Err(SolveError::Exhausted(self.max_steps));
            }
            if cancel.is_cancelled() {
                return Err(SolveError::Cancelled);
            }
            placed.insert(replica, node);
            if self.search(prepared, evaluator, placed, steps, cancel)? {
                return Ok(true);
            }
            placed.remove(&replica);
        }
        Ok(false)
    }

    /// Hill-climb from a feasible placement. Returns the passes run.
    fn improve(
        &self,
        prepared: &Prepared,
        evaluator: &Evaluator<'_>,
        placed: &mut BTreeMap<ReplicaId, NodeId>,
        cancel: &CancelFlag,
    ) -> Result<u32, SolveError> {
        let mut current = evaluator.score(placed);
        // Nothing to climb without objectives.
        if prepared.free.is_empty() || current.0.is_empty() {
            return Ok(0);
        }
        for pass in 0..self.improvement_passes {
            if cancel.is_cancelled() {
                return Err(SolveError::Cancelled);
            }
            let mut improved = false;

            for var in &prepared.free {
                let id = var.replica_id;
                let Some(&from) = placed.get(&id) else { continue };
                let mut best: Option<(Score, NodeId)> = None;
                for node in prepared.available(id, placed) {
                    if node == from {
                        continue;
                    }
                    placed.insert(id, node);
                    let score = evaluator.score(placed);
                    if score > current && best.as_ref().is_none_or(|(b, _)| score > *b) {
                        best = Some((score, node));
                    }
                }
                match best {
                    Some((score, node)) => {
                        placed.insert(id, node);
                        current = score;
                        improved = true;
                    }
                    None => {
                        placed.insert(id, from);
                    }
                }
            }

            for (i, a) in prepared.free.iter().enumerate() {
                for b in &prepared.free[i + 1..] {
                    let (Some(&na), Some(&nb)) = (placed.get(&a.replica_id), placed.get(&b.replica_id))
                    else {
                        continue;
                    };
                    if na == nb
                        || !prepared.allows(a.replica_id, nb)
                        || !prepared.allows(b.replica_id, na)
                    {
                        continue;
                    }
                    placed.insert(a.replica_id, nb);
                    placed.insert(b.replica_id, na);
                    let feasible = !prepared.conflicts(a.replica_id, nb, placed)
                        && !prepared.conflicts(b.replica_id, na, placed);
                    let score = evaluator.score(placed);
                    if feasible && score > current {
                        current = score;
                        improved = true;
                    } else {
                        placed.insert(a.replica_id, na);
                        placed.insert(b.replica_id, nb);
                    }
                }
            }

            if !improved {
                return Ok(pass + 1);
            }
        }
        Ok(self.improvement_passes)
    }
}

/// Candidate sets and peer groups after propagation.
struct Prepared {
    /// Unpinned replicas in id order.
    free: Vec<ReplicaVar>,
    pinned: BTreeMap<ReplicaId, NodeId>,
    candidates: BTreeMap<ReplicaId, BTreeSet<NodeId>>,
    groups: Vec<Vec<ReplicaId>>,
    groups_of: BTreeMap<ReplicaId, Vec<usize>>,
}

impl Prepared {
    fn new(problem: &Problem) -> Result<Self, SolveError> {
        let domain: BTreeSet<NodeId> = problem.domain.iter().copied().collect();
        let known: BTreeSet<ReplicaId> = problem.variables.iter().map(|v| v.replica_id).collect();
        let mut candidates: BTreeMap<ReplicaId, BTreeSet<NodeId>> =
            known.iter().map(|id| (*id, domain.clone())).collect();
        let mut pinned = BTreeMap::new();
        let mut groups = Vec::new();

        for constraint in &problem.constraints {
            match constraint {
                HardConstraint::Affinity {
                    replica_id,
                    rule,
                    matching,
                } => {
                    let Some(set) = candidates.get_mut(replica_id) else { continue };
                    match rule.constraint_type {
                        ConstraintType::Required => set.retain(|n| matching.contains(n)),
                        ConstraintType::Prohibited => set.retain(|n| !matching.contains(n)),
                    }
                }
                HardConstraint::Pin {
                    replica_id,
                    node_id,
                } => {
                    if known.contains(replica_id) {
                        pinned.insert(*replica_id, *node_id);
                    }
                }
                HardConstraint::AllDifferent { replicas, .. } => {
                    let members: Vec<ReplicaId> =
                        replicas.iter().filter(|r| known.contains(r)).copied().collect();
                    if members.len() > 1 {
                        groups.push(members);
                    }
                }
            }
        }

        for (replica, node) in &pinned {
            let set = candidates.entry(*replica).or_default();
            if !set.contains(node) {
                return Err(SolveError::Infeasible(format!(
                    "running replica {replica} on node {node} violates its constraints"
                )));
            }
            *set = BTreeSet::from([*node]);
        }

        let mut groups_of: BTreeMap<ReplicaId, Vec<usize>> = BTreeMap::new();
        for (g, members) in groups.iter().enumerate() {
            let mut taken = BTreeMap::new();
            for m in members {
                if let Some(node) = pinned.get(m) {
                    if let Some(other) = taken.insert(*node, *m) {
                        return Err(SolveError::Infeasible(format!(
                            "replicas {other} and {m} of one range both run on node {node}"
                        )));
                    }
                }
                groups_of.entry(*m).or_default().push(g);
            }
            for m in members.iter().filter(|m| !pinned.contains_key(m)) {
                if let Some(set) = candidates.get_mut(m) {
                    set.retain(|n| !taken.contains_key(n));
                }
            }
        }

        let free: Vec<ReplicaVar> = problem
            .variables
            .iter()
            .filter(|v| !pinned.contains_key(&v.replica_id))
            .copied()
            .collect();

        for var in &free {
            if candidates.get(&var.replica_id).is_none_or(BTreeSet::is_empty) {
                return Err(SolveError::Infeasible(format!(
                    "no node satisfies the constraints of replica {}",
                    var.replica_id
                )));
            }
        }

        // Pigeonhole: a range can't place more replicas than it has nodes for.
        for members in &groups {
            let open: Vec<&ReplicaId> = members.iter().filter(|m| !pinned.contains_key(m)).collect();
            let reachable: BTreeSet<NodeId> = open
                .iter()
                .filter_map(|m| candidates.get(m))
                .flatten()
                .copied()
                .collect();
            if open.len() > reachable.len() {
                return Err(SolveError::Infeasible(format!(
                    "{} replicas of one range need distinct nodes but only {} qualify",
                    open.len(),
                    reachable.len()
                )));
            }
        }

        Ok(Self {
            free,
            pinned,
            candidates,
            groups,
            groups_of,
        })
    }

    fn allows(&self, replica: ReplicaId, node: NodeId) -> bool {
        self.candidates
            .get(&replica)
            .is_some_and(|set| set.contains(&node))
    }

    /// Whether another replica of one of `replica`'s ranges sits on `node`.
    fn conflicts(&self, replica: ReplicaId, node: NodeId, placed: &BTreeMap<ReplicaId, NodeId>) -> bool {
        self.groups_of.get(&replica).is_some_and(|gs| {
            gs.iter().any(|g| {
                self.groups[*g]
                    .iter()
                    .any(|m| *m != replica && placed.get(m) == Some(&node))
            })
        })
    }

    fn available(&self, replica: ReplicaId, placed: &BTreeMap<ReplicaId, NodeId>) -> Vec<NodeId> {
        self.candidates
            .get(&replica)
            .map(|set| {
                set.iter()
                    .copied()
                    .filter(|n| !self.conflicts(replica, *n, placed))
                    .collect()
            })
            .unwrap_or_default()
    }
}
