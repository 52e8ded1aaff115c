//! Signal derivation: turn one [`Snapshot`] into named, typed signal values.
//!
//! Every recipe is pure. A failure deriving one signal substitutes that
//! signal's default and never aborts the rest of the pass.

use std::collections::HashSet;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;
use shift_core::{SignalValue, Snapshot};
use tracing::{trace, warn};

use crate::catalog::{Catalog, Derivation, Predicate, SignalDef, SignalType};
use crate::error::DeriveError;

/// Derived signal map for one snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalValues {
    values: IndexMap<String, SignalValue>,
    defaulted: HashSet<String>,
}

impl SignalValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&SignalValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Whether `name` holds a substituted default rather than an observed value.
    pub fn is_defaulted(&self, name: &str) -> bool {
        self.defaulted.contains(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: SignalValue) {
        let name = name.into();
        self.defaulted.remove(&name);
        self.values.insert(name, value);
    }

    pub fn insert_default(&mut self, name: impl Into<String>, value: SignalValue) {
        let name = name.into();
        self.defaulted.insert(name.clone());
        self.values.insert(name, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SignalValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Derive every catalog signal from `snapshot`.
pub fn derive_all(catalog: &Catalog, snapshot: &Snapshot) -> SignalValues {
    let mut out = SignalValues::new();
    for def in catalog.iter() {
        match derive_signal(def, snapshot, catalog.fallback_prefix()) {
            Ok(Some(value)) => out.insert(def.name.clone(), value),
            Ok(None) => {
                trace!(signal = %def.name, "input missing, using default");
                out.insert_default(def.name.clone(), fallback(def));
            }
            Err(e) => {
                warn!(
                    signal = %def.name,
                    identity = %snapshot.identity,
                    error = %e,
                    "derivation failed, using default"
                );
                out.insert_default(def.name.clone(), fallback(def));
            }
        }
    }
    out
}

/// Derive one signal. `Ok(None)` means the input was absent or unmapped and
/// the caller should substitute the default.
pub fn derive_signal(
    def: &SignalDef,
    snapshot: &Snapshot,
    fallback_prefix: &str,
) -> Result<Option<SignalValue>, DeriveError> {
    match &def.derive {
        Derivation::Path { path } => match resolve_path(snapshot, path, fallback_prefix) {
            None | Some(Value::Null) => Ok(None),
            Some(raw) => coerce(def, raw).map(Some),
        },
        Derivation::Flag {
            field,
            bit,
            inverted,
            set,
            clear,
        } => {
            let Some(raw) = resolve_path(snapshot, field, fallback_prefix) else {
                return Ok(None);
            };
            let on = test_bit(field, raw, *bit)? != *inverted;
            match def.signal_type {
                SignalType::Enum => {
                    let label = if on { set } else { clear };
                    Ok(label.clone().map(SignalValue::Text))
                }
                _ => Ok(Some(SignalValue::Bool(on))),
            }
        }
        Derivation::Map { path, table, .. } => {
            let Some(raw) = resolve_path(snapshot, path, fallback_prefix) else {
                return Ok(None);
            };
            let key = SignalValue::from_json(raw)
                .and_then(|v| v.scalar_key())
                .ok_or_else(|| DeriveError::TypeMismatch {
                    expected: def.signal_type,
                    found: json_shape(raw).to_string(),
                })?;
            Ok(table.get(&key).cloned().map(SignalValue::Text))
        }
        Derivation::Recent { event, within } => Ok(Some(SignalValue::Bool(recent(
            snapshot, event, *within,
        )))),
        Derivation::FirstMatch { cases, .. } => Ok(cases
            .iter()
            .find(|case| predicate(&case.when, snapshot, fallback_prefix))
            .map(|case| case.value.clone())),
    }
}

/// Value used when a signal's input is missing or its derivation failed.
fn fallback(def: &SignalDef) -> SignalValue {
    match &def.derive {
        Derivation::Map {
            default: Some(label),
            ..
        } => SignalValue::Text(label.clone()),
        Derivation::FirstMatch {
            default: Some(value),
            ..
        } => value.clone(),
        _ => def.default_value(),
    }
}

/// Dotted lookup. A miss under `<prefix>.` is retried at the root, so
/// `state.Cargo` also finds a top-level `Cargo`.
fn resolve_path<'a>(snapshot: &'a Snapshot, path: &str, prefix: &str) -> Option<&'a Value> {
    snapshot.lookup(path).or_else(|| {
        path.strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('.'))
            .and_then(|rest| snapshot.lookup(rest))
    })
}

fn test_bit(field: &str, raw: &Value, bit: u8) -> Result<bool, DeriveError> {
    let bits = raw
        .as_u64()
        .or_else(|| raw.as_i64().map(|i| i as u64))
        .ok_or_else(|| DeriveError::NotABitfield {
            field: field.to_string(),
            found: raw.to_string(),
        })?;
    Ok(bit < 64 && bits & (1u64 << bit) != 0)
}

fn recent(snapshot: &Snapshot, event: &str, within: f64) -> bool {
    let window = Duration::try_from_secs_f64(within).unwrap_or(Duration::ZERO);
    snapshot.events.occurred_within(event, window, snapshot.at)
}

fn predicate(p: &Predicate, snapshot: &Snapshot, prefix: &str) -> bool {
    match p {
        Predicate::Flag {
            field,
            bit,
            inverted,
        } => resolve_path(snapshot, field, prefix)
            .and_then(|raw| test_bit(field, raw, *bit).ok())
            .is_some_and(|on| on != *inverted),
        Predicate::Recent { event, within } => recent(snapshot, event, *within),
        Predicate::Path { path, equals } => {
            let found = resolve_path(snapshot, path, prefix);
            match (found, equals) {
                (None, _) => false,
                (Some(raw), None) => truthy(raw),
                (Some(raw), Some(expected)) => SignalValue::from_json(raw)
                    .is_some_and(|v| v.loosely_equals(expected)),
            }
        }
        Predicate::And { of } => of.iter().all(|c| predicate(c, snapshot, prefix)),
        Predicate::Or { of } => of.iter().any(|c| predicate(c, snapshot, prefix)),
        Predicate::Not { of } => !predicate(of, snapshot, prefix),
    }
}

fn truthy(raw: &Value) -> bool {
    match raw {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn json_shape(raw: &Value) -> &'static str {
    match raw {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Coerce a raw JSON value found by a `path` recipe to the signal's type.
fn coerce(def: &SignalDef, raw: &Value) -> Result<SignalValue, DeriveError> {
    let mismatch = || DeriveError::TypeMismatch {
        expected: def.signal_type,
        found: json_shape(raw).to_string(),
    };

    match def.signal_type {
        SignalType::Bool => match raw {
            Value::Bool(b) => Ok(SignalValue::Bool(*b)),
            Value::Number(n) => n
                .as_f64()
                .map(|f| SignalValue::Bool(f != 0.0))
                .ok_or_else(mismatch),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(SignalValue::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(SignalValue::Bool(false)),
            _ => Err(mismatch()),
        },
        SignalType::Number => match raw {
            Value::Number(n) => n.as_f64().map(SignalValue::Number).ok_or_else(mismatch),
            Value::Bool(b) => Ok(SignalValue::Number(if *b { 1.0 } else { 0.0 })),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(SignalValue::Number)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        SignalType::String => SignalValue::from_json(raw)
            .and_then(|v| v.scalar_key())
            .map(SignalValue::Text)
            .ok_or_else(mismatch),
        SignalType::Enum => {
            let label = SignalValue::from_json(raw)
                .and_then(|v| v.scalar_key())
                .ok_or_else(mismatch)?;
            if def.is_member(&label) {
                Ok(SignalValue::Text(label))
            } else {
                Err(DeriveError::NotEnumMember { value: label })
            }
        }
        SignalType::Array => match raw {
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    SignalValue::from_json(item)
                        .filter(SignalValue::is_scalar)
                        .ok_or_else(mismatch)
                })
                .collect::<Result<Vec<_>, _>>()
                .map(SignalValue::List),
            _ => Err(mismatch()),
        },
    }
}
