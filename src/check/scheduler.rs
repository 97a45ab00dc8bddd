//! Dependency-ordered schedule expansion.
//!
//! Top-level checks are taken in priority order (declaration order breaks
//! ties); each check's dependency chain is expanded depth-first ahead of it.
//! The first time a check is reached fixes its position. Cycles and unknown
//! ids are configuration errors, not panics or hangs.

use std::collections::{HashMap, HashSet};

use crate::check::types::{Check, CheckId};
use crate::config::{HarnessError, Result};

/// Compute the execution order for a suite's checks.
///
/// Deterministic and idempotent: the same input always yields the same
/// order. Priorities order the top-level scan only and never override
/// dependency constraints.
pub fn execution_order(checks: &[Check]) -> Result<Vec<CheckId>> {
    let mut index: HashMap<&CheckId, &Check> = HashMap::new();
    for check in checks {
        if index.insert(&check.id, check).is_some() {
            return Err(HarnessError::Config(format!(
                "duplicate check id '{}'",
                check.id
            )));
        }
    }

    let mut top: Vec<&Check> = checks.iter().collect();
    // stable sort keeps declaration order within equal priorities
    top.sort_by_key(|c| c.priority);

    let mut order: Vec<CheckId> = Vec::with_capacity(checks.len());
    let mut placed: HashSet<CheckId> = HashSet::with_capacity(checks.len());
    let mut path: Vec<CheckId> = Vec::new();

    for check in top {
        visit(check, &index, &mut order, &mut placed, &mut path)?;
    }
    Ok(order)
}

fn visit(
    check: &Check,
    index: &HashMap<&CheckId, &Check>,
    order: &mut Vec<CheckId>,
    placed: &mut HashSet<CheckId>,
    path: &mut Vec<CheckId>,
) -> Result<()> {
    if placed.contains(&check.id) {
        return Ok(());
    }
    if let Some(pos) = path.iter().position(|id| id == &check.id) {
        let mut cycle: Vec<&str> = path[pos..].iter().map(|id| id.as_str()).collect();
        cycle.push(check.id.as_str());
        return Err(HarnessError::Config(format!(
            "dependency cycle: {}",
            cycle.join(" -> ")
        )));
    }

    path.push(check.id.clone());
    for dep_id in &check.dependencies {
        let dep = index.get(dep_id).ok_or_else(|| {
            HarnessError::Config(format!(
                "check '{}' depends on unknown check '{}'",
                check.id, dep_id
            ))
        })?;
        visit(dep, index, order, placed, path)?;
    }
    path.pop();

    placed.insert(check.id.clone());
    order.push(check.id.clone());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::types::Verdict;

    fn check(id: &str) -> Check {
        Check::new(id, id, |_| Ok(Verdict::pass()))
    }

    fn ids(order: &[CheckId]) -> Vec<&str> {
        order.iter().map(|id| id.as_str()).collect()
    }

    #[test]
    fn test_dependencies_run_before_dependents() {
        let checks = vec![check("b").depends_on(&["a"]), check("a")];
        let order = execution_order(&checks).unwrap();
        assert_eq!(ids(&order), vec!["a", "b"]);
    }

    #[test]
    fn test_first_reached_position_wins() {
        // diamond: c needs a and b, b needs a; a must appear exactly once
        let checks = vec![
            check("c").depends_on(&["a", "b"]),
            check("b").depends_on(&["a"]),
            check("a"),
        ];
        let order = execution_order(&checks).unwrap();
        assert_eq!(ids(&order), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_priority_orders_top_level_scan() {
        let checks = vec![
            check("late").priority(5),
            check("early").priority(1),
            check("tie").priority(1),
        ];
        let order = execution_order(&checks).unwrap();
        assert_eq!(ids(&order), vec!["early", "tie", "late"]);
    }

    #[test]
    fn test_priority_never_overrides_dependencies() {
        // the urgent check still waits for its slow dependency
        let checks = vec![
            check("urgent").priority(-10).depends_on(&["slow"]),
            check("slow").priority(100),
        ];
        let order = execution_order(&checks).unwrap();
        assert_eq!(ids(&order), vec!["slow", "urgent"]);
    }

    #[test]
    fn test_cycle_is_a_configuration_error() {
        let checks = vec![
            check("a").depends_on(&["b"]),
            check("b").depends_on(&["a"]),
        ];
        let err = execution_order(&checks).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("dependency cycle"), "{}", message);
        assert!(message.contains("a -> b -> a") || message.contains("b -> a -> b"));
    }

    #[test]
    fn test_self_cycle_detected() {
        let checks = vec![check("a").depends_on(&["a"])];
        assert!(execution_order(&checks).is_err());
    }

    #[test]
    fn test_unknown_dependency_named_in_error() {
        let checks = vec![check("a").depends_on(&["ghost"])];
        let message = execution_order(&checks).unwrap_err().to_string();
        assert!(message.contains("'a'"));
        assert!(message.contains("'ghost'"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let checks = vec![check("a"), check("a")];
        assert!(execution_order(&checks).is_err());
    }

    #[test]
    fn test_order_is_idempotent() {
        let checks = vec![
            check("c").depends_on(&["b"]),
            check("b").depends_on(&["a"]),
            check("a").priority(3),
        ];
        let first = execution_order(&checks).unwrap();
        let second = execution_order(&checks).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_shared_dependency_scheduled_once() {
        let checks = vec![
            check("x").depends_on(&["shared"]),
            check("y").depends_on(&["shared"]),
            check("shared"),
        ];
        let order = execution_order(&checks).unwrap();
        assert_eq!(order.iter().filter(|id| id.as_str() == "shared").count(), 1);
        assert_eq!(order.len(), 3);
    }
}
