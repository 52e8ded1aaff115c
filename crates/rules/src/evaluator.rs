//! Condition tree evaluator with all/any group support.
//!
//! Evaluates a rule's `when` clause against one pass's derived signals. Leaf
//! conditions compare a signal value; `recent` leaves read the snapshot's
//! event window. Evaluation is fail-closed: a missing signal or an
//! ill-shaped value makes the leaf false, never an error.

use std::time::Duration;

use shift_catalog::SignalValues;
use shift_core::{SignalValue, Snapshot};
use tracing::warn;

use crate::schema::{Condition, ConditionGroup, ConditionNode, Operator};

/// Inputs shared by every condition in one pass.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub signals: &'a SignalValues,
    pub snapshot: &'a Snapshot,
}

impl<'a> EvalContext<'a> {
    pub fn new(signals: &'a SignalValues, snapshot: &'a Snapshot) -> Self {
        Self { signals, snapshot }
    }
}

/// Recursively evaluate a condition node.
pub fn evaluate(node: &ConditionNode, ctx: &EvalContext<'_>) -> bool {
    match node {
        ConditionNode::Leaf(cond) => evaluate_condition(cond, ctx),
        ConditionNode::Group(ConditionGroup::All(members)) => {
            members.iter().all(|m| evaluate(m, ctx))
        }
        ConditionNode::Group(ConditionGroup::Any(members)) => {
            members.iter().any(|m| evaluate(m, ctx))
        }
    }
}

/// Evaluate a single leaf.
pub fn evaluate_condition(cond: &Condition, ctx: &EvalContext<'_>) -> bool {
    if cond.op == Operator::Recent {
        return match (cond.event.as_deref(), cond.within) {
            (Some(event), Some(within)) => {
                let window = Duration::try_from_secs_f64(within).unwrap_or(Duration::ZERO);
                ctx.snapshot
                    .events
                    .occurred_within(event, window, ctx.snapshot.at)
            }
            _ => false,
        };
    }

    let Some(name) = cond.signal.as_deref() else {
        return false;
    };

    let Some(actual) = ctx.signals.get(name) else {
        warn!(
            signal = %name,
            identity = %ctx.snapshot.identity,
            op = %cond.op,
            "condition references a signal absent from this pass, treating as no match"
        );
        return false;
    };

    let expected = cond.value.as_ref();
    match cond.op {
        Operator::Eq => expected.is_some_and(|v| actual.loosely_equals(v)),
        Operator::Ne => expected.is_some_and(|v| !actual.loosely_equals(v)),
        Operator::In => list_contains(expected, actual),
        Operator::Nin => expected.is_some_and(|v| v.as_list().is_some()) && !list_contains(expected, actual),
        Operator::Lt => compare(actual, expected, |a, b| a < b),
        Operator::Lte => compare(actual, expected, |a, b| a <= b),
        Operator::Gt => compare(actual, expected, |a, b| a > b),
        Operator::Gte => compare(actual, expected, |a, b| a >= b),
        Operator::Contains => match (actual.as_list(), expected) {
            (Some(items), Some(v)) => items.iter().any(|item| item.loosely_equals(v)),
            _ => false,
        },
        Operator::Exists => !ctx.signals.is_defaulted(name),
        Operator::Recent => false,
    }
}

fn list_contains(list: Option<&SignalValue>, actual: &SignalValue) -> bool {
    list.and_then(SignalValue::as_list)
        .is_some_and(|items| items.iter().any(|item| actual.loosely_equals(item)))
}

fn compare(actual: &SignalValue, expected: Option<&SignalValue>, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.as_f64(), expected.and_then(SignalValue::as_f64)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use shift_core::{EventStamp, SourceKind};

    fn signals() -> SignalValues {
        let mut s = SignalValues::new();
        s.insert("hardpoints", "deployed".into());
        s.insert("cargo", SignalValue::Number(4.0));
        s.insert("modules", SignalValue::List(vec!["fsd".into(), "shield".into()]));
        s.insert_default("ship", SignalValue::Text(String::new()));
        s
    }

    fn snapshot() -> Snapshot {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        Snapshot::new("cmdr", SourceKind::Status, json!({}))
            .with_time(at)
            .with_events([EventStamp::new("UnderAttack", at - chrono::Duration::seconds(3))].into_iter().collect())
    }

    fn leaf(yaml: &str) -> ConditionNode {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn eval(yaml: &str) -> bool {
        let signals = signals();
        let snap = snapshot();
        evaluate(&leaf(yaml), &EvalContext::new(&signals, &snap))
    }

    #[test]
    fn equality() {
        assert!(eval("{ signal: hardpoints, op: eq, value: deployed }"));
        assert!(!eval("{ signal: hardpoints, op: ne, value: deployed }"));
        assert!(eval("{ signal: cargo, op: eq, value: 4.0000000001 }"));
    }

    #[test]
    fn membership() {
        assert!(eval("{ signal: hardpoints, op: in, value: [retracted, deployed] }"));
        assert!(!eval("{ signal: hardpoints, op: nin, value: [retracted, deployed] }"));
        assert!(eval("{ signal: hardpoints, op: nin, value: [retracted] }"));
    }

    #[test]
    fn ordering() {
        assert!(eval("{ signal: cargo, op: gt, value: 3 }"));
        assert!(eval("{ signal: cargo, op: gte, value: 4 }"));
        assert!(!eval("{ signal: cargo, op: lt, value: 4 }"));
        assert!(eval("{ signal: cargo, op: lte, value: 4 }"));
        assert!(!eval("{ signal: hardpoints, op: gt, value: 1 }"));
    }

    #[test]
    fn contains_and_exists() {
        assert!(eval("{ signal: modules, op: contains, value: fsd }"));
        assert!(!eval("{ signal: modules, op: contains, value: cargo_rack }"));
        assert!(eval("{ signal: cargo, op: exists }"));
        assert!(!eval("{ signal: ship, op: exists }"));
    }

    #[test]
    fn recent_reads_event_window() {
        assert!(eval("{ op: recent, event: UnderAttack, within: 5 }"));
        assert!(!eval("{ op: recent, event: UnderAttack, within: 2 }"));
        assert!(!eval("{ op: recent, event: Docked, within: 60 }"));
    }

    #[test]
    fn absent_signal_is_false_for_every_operator() {
        for op in ["eq", "ne", "in", "nin", "lt", "gt", "contains", "exists"] {
            let yaml = format!("{{ signal: nonexistent, op: {op}, value: [1] }}");
            assert!(!eval(&yaml), "op {op} should fail closed");
        }
    }

    #[test]
    fn empty_groups() {
        assert!(eval("all: []"));
        assert!(!eval("any: []"));
    }

    #[test]
    fn nested_groups() {
        assert!(eval(
            r#"
all:
  - { signal: hardpoints, op: eq, value: deployed }
  - any:
      - { signal: cargo, op: gt, value: 100 }
      - { op: recent, event: UnderAttack, within: 10 }
"#
        ));
        assert!(!eval(
            r#"
any:
  - { signal: hardpoints, op: eq, value: retracted }
  - all:
      - { signal: cargo, op: gt, value: 100 }
"#
        ));
    }
}
