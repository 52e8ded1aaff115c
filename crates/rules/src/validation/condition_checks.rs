//! Condition validation: signal references, operator/type fit, value shape.

use shift_catalog::{Catalog, ReferenceError, SignalDef, SignalType};
use shift_core::SignalValue;

use super::ValidationResult;
use crate::schema::{Condition, ConditionGroup, ConditionNode, Operator};

pub(super) fn validate_node(
    node: &ConditionNode,
    path: &str,
    catalog: &Catalog,
    result: &mut ValidationResult,
) {
    match node {
        ConditionNode::Leaf(cond) => validate_condition(cond, path, catalog, result),
        ConditionNode::Group(group) => {
            let base = format!("{path}.{}", group.keyword());
            if group.members().is_empty() {
                let always = match group {
                    ConditionGroup::All(_) => "always true",
                    ConditionGroup::Any(_) => "never true",
                };
                result.warn(&base, format!("empty `{}` group is {always}", group.keyword()));
            }
            for (i, member) in group.members().iter().enumerate() {
                validate_node(member, &format!("{base}[{i}]"), catalog, result);
            }
        }
    }
}

fn validate_condition(cond: &Condition, path: &str, catalog: &Catalog, result: &mut ValidationResult) {
    if cond.op == Operator::Recent {
        validate_recent(cond, path, result);
        return;
    }

    if cond.event.is_some() || cond.within.is_some() {
        result.error(path, format!("`event`/`within` only apply to `recent`, not `{}`", cond.op));
    }

    let Some(signal) = cond.signal.as_deref() else {
        result.error(format!("{path}.signal"), format!("`{}` requires a signal", cond.op));
        return;
    };

    let def = match catalog.validate_reference(signal, None) {
        Ok(def) => def,
        Err(e) => {
            report_reference(&e, &format!("{path}.signal"), result);
            return;
        }
    };

    if def.signal_type == SignalType::Bool && !matches!(cond.op, Operator::Eq | Operator::Ne) {
        result.error(
            format!("{path}.op"),
            format!("boolean signal '{}' supports only eq/ne, got `{}`", def.name, cond.op),
        );
        return;
    }

    let value_path = format!("{path}.value");
    match cond.op {
        Operator::Eq | Operator::Ne => match &cond.value {
            Some(SignalValue::List(_)) => result.error(
                &value_path,
                format!("`{}` compares against a scalar; use `in`/`nin` for lists", cond.op),
            ),
            Some(v) if def.signal_type == SignalType::Array => {
                result.error(&value_path, format!("array signal '{}' cannot be compared with `{}` to {v}; use `contains`", def.name, cond.op))
            }
            Some(v) => check_value(catalog, def, v, &value_path, result),
            None => result.error(&value_path, format!("`{}` requires a value", cond.op)),
        },
        Operator::In | Operator::Nin => match &cond.value {
            Some(SignalValue::List(items)) => {
                if items.is_empty() {
                    result.warn(&value_path, format!("empty `{}` list", cond.op));
                }
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{value_path}[{i}]");
                    if !item.is_scalar() {
                        result.error(&item_path, "list members must be scalars");
                    } else {
                        check_value(catalog, def, item, &item_path, result);
                    }
                }
            }
            _ => result.error(&value_path, format!("`{}` requires a list value", cond.op)),
        },
        Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
            if def.signal_type != SignalType::Number {
                result.error(
                    format!("{path}.op"),
                    format!("`{}` applies to number signals only; '{}' is {}", cond.op, def.name, def.signal_type),
                );
            }
            match &cond.value {
                Some(SignalValue::Number(_)) => {}
                _ => result.error(&value_path, format!("`{}` requires a number value", cond.op)),
            }
        }
        Operator::Contains => {
            if def.signal_type != SignalType::Array {
                result.error(
                    format!("{path}.op"),
                    format!("`contains` applies to array signals only; '{}' is {}", def.name, def.signal_type),
                );
            }
            match &cond.value {
                Some(v) if v.is_scalar() => {}
                _ => result.error(&value_path, "`contains` requires a scalar value"),
            }
        }
        Operator::Exists => {
            if cond.value.is_some() {
                result.warn(&value_path, "`exists` ignores its value");
            }
        }
        Operator::Recent => {}
    }
}

fn validate_recent(cond: &Condition, path: &str, result: &mut ValidationResult) {
    match cond.event.as_deref() {
        Some(e) if !e.trim().is_empty() => {}
        _ => result.error(format!("{path}.event"), "`recent` requires an event name"),
    }
    match cond.within {
        Some(w) if w.is_finite() && w > 0.0 => {}
        Some(w) => result.error(
            format!("{path}.within"),
            format!("`within` must be a positive number of seconds, got {w}"),
        ),
        None => result.error(format!("{path}.within"), "`recent` requires `within` seconds"),
    }
    if cond.signal.is_some() {
        result.warn(format!("{path}.signal"), "`recent` tests an event; `signal` is ignored");
    }
}

fn check_value(
    catalog: &Catalog,
    def: &SignalDef,
    value: &SignalValue,
    path: &str,
    result: &mut ValidationResult,
) {
    if let Err(e) = catalog.validate_reference(&def.name, Some(value)) {
        report_reference(&e, path, result);
    }
}

fn report_reference(err: &ReferenceError, path: &str, result: &mut ValidationResult) {
    result.error_with_suggestion(path, err.to_string(), err.suggestion().map(str::to_string));
}
