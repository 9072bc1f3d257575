//! Human-readable state dump.

use std::fmt;

use zoneplace_state::{NodeInfo, ReplicaState, Topology};

/// Renders every table of a snapshot plus the derived placement views.
pub struct StateReport<'a>(pub &'a Topology);

impl fmt::Display for StateReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.0;

        writeln!(f, "databases:")?;
        for db in t.databases.values() {
            writeln!(
                f,
                "  {:>4}  {:<16} replicas={} constraints={}",
                db.id,
                db.name,
                db.num_replicas,
                if db.placement_constraints.is_empty() {
                    "-"
                } else {
                    db.placement_constraints.as_str()
                }
            )?;
        }

        writeln!(f, "ranges:")?;
        for range in t.ranges.values() {
            let db = t
                .databases
                .get(&range.database_id)
                .map_or("?", |d| d.name.as_str());
            writeln!(f, "  {:>4}  database={db}", range.id)?;
        }

        writeln!(f, "nodes:")?;
        for node in t.nodes.values() {
            writeln!(f, "  {:>4}  {}", node.id, labels(node))?;
        }

        writeln!(f, "node labels:")?;
        for node in t.nodes.values() {
            for label in &node.labels {
                writeln!(
                    f,
                    "  {:>4}  {:<11} {}={}",
                    node.id,
                    format!("{:?}", label.kind).to_lowercase(),
                    label.key,
                    label.value.as_deref().unwrap_or("")
                )?;
            }
        }

        writeln!(f, "replicas:")?;
        for replica in t.replicas.values() {
            writeln!(f, "  {}", replica_line(replica))?;
        }

        writeln!(f, "replica constraints:")?;
        for rows in t.constraints.values() {
            for row in rows {
                writeln!(
                    f,
                    "  replica={:<4} range={:<4} {}",
                    row.replica_id, row.range_id, row.rule
                )?;
            }
        }

        writeln!(f, "replica matching nodes:")?;
        for replica in t.replicas.values() {
            let rows = t.constraints_for(replica.id);
            let matching: Vec<String> = t
                .nodes
                .values()
                .filter(|n| rows.iter().all(|c| c.rule.is_satisfied_by(n)))
                .map(|n| n.id.to_string())
                .collect();
            writeln!(f, "  replica={:<4} nodes=[{}]", replica.id, matching.join(","))?;
        }

        writeln!(f, "node zones:")?;
        for node in t.nodes.values() {
            let zones: Vec<&str> = node.label_values("az").collect();
            writeln!(f, "  {:>4}  az={}", node.id, zones.join(","))?;
        }

        writeln!(f, "pending replicas:")?;
        for replica in t.pending_replicas() {
            writeln!(f, "  replica={:<4} range={}", replica.id, replica.range_id)?;
        }
        Ok(())
    }
}

fn labels(node: &NodeInfo) -> String {
    node.labels
        .iter()
        .map(|l| match &l.value {
            Some(v) => format!("{}{}{v}", l.key, l.kind.separator()),
            None => l.key.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn replica_line(r: &ReplicaState) -> String {
    let node = |n: Option<u64>| n.map_or_else(|| "-".to_string(), |n| n.to_string());
    format!(
        "replica={:<4} range={:<4} status={:<8} current={:<4} controllable={}",
        r.id,
        r.range_id,
        r.status.to_string(),
        node(r.current_node),
        node(r.controllable_node)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use zoneplace_state::*;

    fn sample() -> Topology {
        let mut t = Topology::default();
        t.nodes.insert(
            1,
            NodeInfo {
                id: 1,
                labels: vec![
                    NodeLabel {
                        key: "az".to_string(),
                        value: Some("us-east-1".to_string()),
                        kind: LabelKind::Locality,
                    },
                    NodeLabel {
                        key: "ssd".to_string(),
                        value: None,
                        kind: LabelKind::Store,
                    },
                ],
            },
        );
        t.nodes.insert(2, NodeInfo { id: 2, labels: vec![] });
        t.databases.insert(
            1,
            DatabaseSpec {
                id: 1,
                name: "db1".to_string(),
                num_replicas: 1,
                placement_constraints: r#"["+ssd"]"#.to_string(),
            },
        );
        t.ranges.insert(1, RangeInfo { id: 1, database_id: 1 });
        t.replicas.insert(1, ReplicaState::pending(1, 1));
        let rule = ConstraintRule {
            constraint_type: ConstraintType::Required,
            label_key: "ssd".to_string(),
            label_value: None,
        };
        t.constraints.insert(1, vec![rule.bind(1, 1)]);
        t
    }

    #[test]
    fn report_lists_every_section() {
        let text = StateReport(&sample()).to_string();
        for section in [
            "databases:",
            "ranges:",
            "nodes:",
            "node labels:",
            "replicas:",
            "replica constraints:",
            "replica matching nodes:",
            "node zones:",
            "pending replicas:",
        ] {
            assert!(text.contains(section), "missing {section}");
        }
    }

    #[test]
    fn report_shows_derived_views() {
        let text = StateReport(&sample()).to_string();
        assert!(text.contains("az=us-east-1 ssd"));
        assert!(text.contains("+ssd"));
        assert!(text.contains("nodes=[1]"));
        assert!(text.contains("status=pending"));
    }
}
