//! Constraint compiler: scope → per-replica constraint rules.
//!
//! The output is one slot per replica of a range (`num_replicas` slots).
//! Slot `i` is attached to the i-th replica of each range in replica-id
//! order by the store. Within a slot, Required rules come first and then
//! Prohibited ones, each in selector order, so compiling the same input
//! twice yields identical rows.

use zoneplace_state::{ConstraintRule, ConstraintType};

use crate::error::CompileError;
use crate::scope::{ScopeSpec, Selector};

/// Largest replication factor a database may ask for.
pub const MAX_NUM_REPLICAS: u32 = 256;

/// Decode and compile a zone-configuration string.
pub fn compile(num_replicas: u32, constraints_json: &str) -> Result<Vec<Vec<ConstraintRule>>, CompileError> {
    check_factor(num_replicas)?;
    let scope = ScopeSpec::parse(constraints_json)?;
    compile_scope(&scope, num_replicas)
}

/// Compile an already-decoded scope.
pub fn compile_scope(
    scope: &ScopeSpec,
    num_replicas: u32,
) -> Result<Vec<Vec<ConstraintRule>>, CompileError> {
    check_factor(num_replicas)?;
    let slots = num_replicas as usize;
    match scope {
        ScopeSpec::Uniform(selectors) => Ok(vec![rules(selectors); slots]),
        ScopeSpec::PerGroup(groups) => {
            let constrained = scope.constrained_replicas().unwrap_or(0);
            if constrained > u64::from(num_replicas) {
                return Err(CompileError::OverSubscribed {
                    constrained,
                    num_replicas,
                });
            }
            let mut out = Vec::with_capacity(slots);
            for (selectors, count) in groups {
                let group_rules = rules(selectors);
                out.extend(std::iter::repeat_n(group_rules, *count as usize));
            }
            // Replicas beyond the constrained ones may go anywhere.
            out.resize(slots, Vec::new());
            Ok(out)
        }
    }
}

fn check_factor(num_replicas: u32) -> Result<(), CompileError> {
    match num_replicas {
        0 => Err(CompileError::ZeroReplicas),
        n if n > MAX_NUM_REPLICAS => Err(CompileError::TooManyReplicas(n)),
        _ => Ok(()),
    }
}

fn rules(selectors: &[Selector]) -> Vec<ConstraintRule> {
    let required = selectors
        .iter()
        .filter(|s| s.constraint_type == ConstraintType::Required);
    let prohibited = selectors
        .iter()
        .filter(|s| s.constraint_type == ConstraintType::Prohibited);
    required.chain(prohibited).map(Selector::to_rule).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(slots: &[Vec<ConstraintRule>]) -> Vec<String> {
        slots
            .iter()
            .map(|s| s.iter().map(ToString::to_string).collect::<Vec<_>>().join(","))
            .collect()
    }

    #[test]
    fn uniform_scope_applies_to_every_replica() {
        let slots = compile(3, r#"["-region=east", "+ssd"]"#).unwrap();
        assert_eq!(render(&slots), vec!["+ssd,-region=east"; 3]);
    }

    #[test]
    fn per_group_scope_fills_slots_in_key_order() {
        let slots = compile(
            4,
            r#"{"[\"+ssd\",\"+region=west\"]": 2, "[\"+region=east\"]": 1}"#,
        )
        .unwrap();
        assert_eq!(
            render(&slots),
            vec!["+ssd,+region=west", "+ssd,+region=west", "+region=east", ""]
        );
    }

    #[test]
    fn compiling_twice_is_identical() {
        let json = r#"{"[\"+az=b\",\"-ssd\"]": 1, "[\"+az=a\"]": 2}"#;
        assert_eq!(compile(5, json).unwrap(), compile(5, json).unwrap());
    }

    #[test]
    fn empty_string_compiles_to_free_replicas() {
        let slots = compile(5, "").unwrap();
        assert_eq!(slots.len(), 5);
        assert!(slots.iter().all(Vec::is_empty));
    }

    #[test]
    fn oversubscribed_groups_are_rejected() {
        let err = compile(3, r#"{"[\"+a\"]": 2, "[\"+b\"]": 2}"#).unwrap_err();
        assert_eq!(
            err,
            CompileError::OverSubscribed {
                constrained: 4,
                num_replicas: 3
            }
        );
    }

    #[test]
    fn zero_replicas_are_rejected() {
        assert_eq!(compile(0, "").unwrap_err(), CompileError::ZeroReplicas);
    }

    #[test]
    fn oversized_factor_is_rejected() {
        assert_eq!(
            compile(u32::MAX, "").unwrap_err(),
            CompileError::TooManyReplicas(u32::MAX)
        );
        assert_eq!(compile(MAX_NUM_REPLICAS, "").unwrap().len(), 256);
    }

    #[test]
    fn malformed_selector_fails_the_whole_compile() {
        assert!(matches!(
            compile(3, r#"["+ssd", "+a=b=c"]"#),
            Err(CompileError::MalformedSelector(_))
        ));
    }
}
