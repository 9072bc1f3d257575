//! Scoring of placements against the soft objectives.
//!
//! A [`Score`] has one component per objective, in priority order, each
//! oriented so that larger is better. Scores compare lexicographically, so
//! a lower-priority objective only breaks ties of the ones before it.
//!
//! Scoring works on partial placements too: replicas without a node simply
//! don't count. The search uses this to order candidate values.

use std::collections::BTreeMap;

use zoneplace_state::{NodeId, RangeId, ReplicaId};

use crate::problem::{Aggregate, Direction, Grouping, Objective, Problem};

/// Lexicographic objective vector, larger is better.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Score(pub Vec<i64>);

/// Scores placements of one problem.
pub struct Evaluator<'a> {
    objectives: &'a [Objective],
    range_of: BTreeMap<ReplicaId, RangeId>,
    ranges: Vec<RangeId>,
    node_index: BTreeMap<NodeId, usize>,
}

impl<'a> Evaluator<'a> {
    pub fn new(problem: &'a Problem) -> Self {
        let range_of: BTreeMap<ReplicaId, RangeId> = problem
            .variables
            .iter()
            .map(|v| (v.replica_id, v.range_id))
            .collect();
        let mut ranges: Vec<RangeId> = range_of.values().copied().collect();
        ranges.sort_unstable();
        ranges.dedup();
        Self {
            objectives: &problem.objectives,
            range_of,
            ranges,
            node_index: problem
                .domain
                .iter()
                .enumerate()
                .map(|(i, n)| (*n, i))
                .collect(),
        }
    }

    /// Score a (possibly partial) placement of replicas onto nodes.
    pub fn score(&self, placed: &BTreeMap<ReplicaId, NodeId>) -> Score {
        Score(
            self.objectives
                .iter()
                .map(|o| {
                    let value = self.evaluate(o, placed);
                    match o.direction {
                        Direction::Maximize => value,
                        Direction::Minimize => -value,
                    }
                })
                .collect(),
        )
    }

    fn evaluate(&self, objective: &Objective, placed: &BTreeMap<ReplicaId, NodeId>) -> i64 {
        match &objective.grouping {
            Grouping::PerNode => {
                let mut counts = vec![0i64; self.node_index.len()];
                for node in placed.values() {
                    if let Some(&i) = self.node_index.get(node) {
                        counts[i] += 1;
                    }
                }
                aggregate(objective.aggregate, &counts)
            }
            Grouping::PerRange {
                members, groups, ..
            } => {
                if *groups == 0 {
                    return 0;
                }
                let mut per_range: BTreeMap<RangeId, Vec<i64>> = self
                    .ranges
                    .iter()
                    .map(|r| (*r, vec![0i64; *groups]))
                    .collect();
                for (replica, node) in placed {
                    let (Some(range), Some(buckets)) = (self.range_of.get(replica), members.get(node))
                    else {
                        continue;
                    };
                    if let Some(counts) = per_range.get_mut(range) {
                        for &b in buckets {
                            counts[b] += 1;
                        }
                    }
                }
                per_range
                    .values()
                    .map(|counts| aggregate(objective.aggregate, counts))
                    .sum()
            }
        }
    }
}

fn aggregate(aggregate: Aggregate, counts: &[i64]) -> i64 {
    match aggregate {
        Aggregate::Min => counts.iter().copied().min().unwrap_or(0),
        Aggregate::Max => counts.iter().copied().max().unwrap_or(0),
        Aggregate::Count => counts.iter().filter(|c| **c > 0).count() as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::ReplicaVar;

    /// Three nodes in two zones: 1,2 → zone 0, 3 → zone 1. Two ranges.
    fn problem(objectives: Vec<Objective>) -> Problem {
        Problem {
            domain: vec![1, 2, 3],
            variables: vec![
                ReplicaVar { replica_id: 10, range_id: 1 },
                ReplicaVar { replica_id: 11, range_id: 1 },
                ReplicaVar { replica_id: 20, range_id: 2 },
            ],
            constraints: vec![],
            objectives,
        }
    }

    fn zones(aggregate: Aggregate, direction: Direction) -> Objective {
        Objective {
            policy: "spread",
            grouping: Grouping::PerRange {
                key: "az".to_string(),
                members: BTreeMap::from([(1, vec![0]), (2, vec![0]), (3, vec![1])]),
                groups: 2,
            },
            aggregate,
            direction,
        }
    }

    #[test]
    fn per_range_min_rewards_spreading() {
        let p = problem(vec![zones(Aggregate::Min, Direction::Maximize)]);
        let eval = Evaluator::new(&p);

        let packed = eval.score(&BTreeMap::from([(10, 1), (11, 2)]));
        let spread = eval.score(&BTreeMap::from([(10, 1), (11, 3)]));

        assert!(spread > packed);
        assert_eq!(spread, Score(vec![1]));
    }

    #[test]
    fn minimize_is_negated() {
        let p = problem(vec![zones(Aggregate::Max, Direction::Minimize)]);
        let eval = Evaluator::new(&p);
        // Range 1 has max 2 in zone 0, range 2 has max 1.
        assert_eq!(eval.score(&BTreeMap::from([(10, 1), (11, 2), (20, 3)])), Score(vec![-3]));
    }

    #[test]
    fn per_node_counts_every_domain_node() {
        let objective = Objective {
            policy: "nodes",
            grouping: Grouping::PerNode,
            aggregate: Aggregate::Min,
            direction: Direction::Maximize,
        };
        let p = problem(vec![objective]);
        let eval = Evaluator::new(&p);

        assert_eq!(eval.score(&BTreeMap::from([(10, 1), (11, 2)])), Score(vec![0]));
        assert_eq!(eval.score(&BTreeMap::from([(10, 1), (11, 2), (20, 3)])), Score(vec![1]));
    }

    #[test]
    fn count_aggregate_counts_occupied_groups() {
        let p = problem(vec![zones(Aggregate::Count, Direction::Maximize)]);
        let eval = Evaluator::new(&p);
        assert_eq!(eval.score(&BTreeMap::from([(10, 1), (11, 3), (20, 2)])), Score(vec![3]));
    }

    #[test]
    fn earlier_objectives_dominate() {
        let a = Score(vec![1, -10]);
        let b = Score(vec![0, 5]);
        assert!(a > b);
    }
}
