//! Catalog loading: two-pass parse, then per-recipe shape validation.
//!
//! First pass walks the raw YAML so that missing fields and unknown operator
//! tags surface as precise [`CatalogError`] variants. Second pass deserializes
//! each recipe into its typed [`Derivation`]. Nothing is returned unless every
//! signal passes.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use shift_core::SignalValue;
use tracing::info;

use super::types::{Derivation, Predicate, SignalDef, SignalType};
use super::{Catalog, DEFAULT_FALLBACK_PREFIX};
use crate::error::{CatalogError, Result};

impl Catalog {
    /// Read and parse a catalog file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let catalog = Self::from_yaml(&contents)?;
        info!(path = %path.display(), signals = catalog.len(), "loaded signal catalog");
        Ok(catalog)
    }

    /// Parse a catalog document:
    ///
    /// ```yaml
    /// fallback_prefix: state
    /// signals:
    ///   - name: hardpoints
    ///     type: enum
    ///     values: [retracted, deployed]
    ///     derive: { op: flag, field: Flags, bit: 6, set: deployed, clear: retracted }
    /// ```
    pub fn from_yaml(source: &str) -> Result<Self> {
        let doc: Value = serde_yaml::from_str(source)?;
        let root = doc.as_mapping().ok_or_else(|| CatalogError::MissingField {
            signal: "<document>".to_string(),
            field: "signals".to_string(),
        })?;

        let fallback_prefix = match root.get("fallback_prefix") {
            Some(Value::String(p)) => p.clone(),
            Some(_) => {
                return Err(CatalogError::InvalidRecipe {
                    signal: "<document>".to_string(),
                    reason: "`fallback_prefix` must be a string".to_string(),
                })
            }
            None => DEFAULT_FALLBACK_PREFIX.to_string(),
        };

        let raw_signals = match root.get("signals") {
            Some(Value::Sequence(seq)) => seq,
            Some(Value::Null) | None => {
                return Err(CatalogError::MissingField {
                    signal: "<document>".to_string(),
                    field: "signals".to_string(),
                })
            }
            Some(_) => {
                return Err(CatalogError::InvalidRecipe {
                    signal: "<document>".to_string(),
                    reason: "`signals` must be a list".to_string(),
                })
            }
        };

        let defs = raw_signals
            .iter()
            .enumerate()
            .map(|(i, raw)| parse_signal(i, raw))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_defs(defs)?.with_fallback_prefix(fallback_prefix))
    }

    /// Build a catalog from already-typed definitions, validating each one.
    pub fn from_defs(defs: Vec<SignalDef>) -> Result<Self> {
        let mut signals = IndexMap::with_capacity(defs.len());
        for def in defs {
            validate_def(&def)?;
            if signals.contains_key(&def.name) {
                return Err(CatalogError::DuplicateName(def.name));
            }
            signals.insert(def.name.clone(), def);
        }
        Ok(Self {
            signals,
            fallback_prefix: DEFAULT_FALLBACK_PREFIX.to_string(),
        })
    }

    /// Replace the reserved path-fallback prefix.
    pub fn with_fallback_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.fallback_prefix = prefix.into();
        self
    }
}

// ── First pass: raw YAML ────────────────────────────────────────────

fn parse_signal(index: usize, raw: &Value) -> Result<SignalDef> {
    let placeholder = format!("#{index}");
    let map = raw.as_mapping().ok_or_else(|| CatalogError::MissingField {
        signal: placeholder.clone(),
        field: "name".to_string(),
    })?;

    let name = match map.get("name") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => {
            return Err(CatalogError::MissingField {
                signal: placeholder,
                field: "name".to_string(),
            })
        }
    };

    let signal_type = match map.get("type") {
        Some(Value::String(t)) => {
            t.parse::<SignalType>()
                .map_err(|_| CatalogError::UnknownType {
                    signal: name.clone(),
                    type_name: t.clone(),
                })?
        }
        Some(other) => {
            return Err(CatalogError::UnknownType {
                signal: name,
                type_name: format!("{other:?}"),
            })
        }
        None => {
            return Err(CatalogError::MissingField {
                signal: name,
                field: "type".to_string(),
            })
        }
    };

    let values = parse_enum_values(&name, map.get("values"))?;

    let derive_raw = map.get("derive").ok_or_else(|| CatalogError::MissingField {
        signal: name.clone(),
        field: "derive".to_string(),
    })?;
    check_ops(&name, derive_raw, "derive", Derivation::OPS)?;
    let derive: Derivation =
        serde_yaml::from_value(stringify_table_keys(derive_raw)).map_err(|e| CatalogError::InvalidRecipe {
            signal: name.clone(),
            reason: e.to_string(),
        })?;

    let default = match map.get("default") {
        None | Some(Value::Null) => None,
        Some(v) => Some(serde_yaml::from_value::<SignalValue>(v.clone()).map_err(|e| {
            CatalogError::InvalidRecipe {
                signal: name.clone(),
                reason: format!("invalid default: {e}"),
            }
        })?),
    };

    Ok(SignalDef {
        tier: string_field(map, "tier"),
        description: string_field(map, "description"),
        name,
        signal_type,
        values,
        default,
        derive,
    })
}

/// `map` tables are keyed by raw scalars (`0: docked`); rewrite the keys as
/// strings so they match [`SignalValue::scalar_key`].
fn stringify_table_keys(raw: &Value) -> Value {
    let mut out = raw.clone();
    if let Some(Value::Mapping(table)) = out.as_mapping_mut().and_then(|m| m.get_mut("table")) {
        let rewritten: Mapping = table
            .iter()
            .map(|(k, v)| {
                let key = match k {
                    Value::String(s) => s.clone(),
                    Value::Bool(b) => b.to_string(),
                    Value::Number(n) => n
                        .as_f64()
                        .and_then(|f| SignalValue::Number(f).scalar_key())
                        .unwrap_or_else(|| n.to_string()),
                    other => format!("{other:?}"),
                };
                (Value::String(key), v.clone())
            })
            .collect();
        *table = rewritten;
    }
    out
}

fn string_field(map: &Mapping, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn parse_enum_values(signal: &str, raw: Option<&Value>) -> Result<Vec<String>> {
    let seq = match raw {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Sequence(seq)) => seq,
        Some(_) => {
            return Err(CatalogError::MalformedEnum {
                signal: signal.to_string(),
                reason: "`values` must be a list of strings".to_string(),
            })
        }
    };
    seq.iter()
        .map(|v| match v {
            Value::String(s) if !s.is_empty() => Ok(s.clone()),
            other => Err(CatalogError::MalformedEnum {
                signal: signal.to_string(),
                reason: format!("enum value {other:?} is not a non-empty string"),
            }),
        })
        .collect()
}

/// Verify every `op` tag in a recipe tree belongs to the closed operator set.
fn check_ops(signal: &str, raw: &Value, path: &str, allowed: &[&str]) -> Result<()> {
    let map = raw.as_mapping().ok_or_else(|| CatalogError::InvalidRecipe {
        signal: signal.to_string(),
        reason: format!("`{path}` must be a mapping"),
    })?;
    let op = match map.get("op") {
        Some(Value::String(op)) => op.as_str(),
        _ => {
            return Err(CatalogError::MissingField {
                signal: signal.to_string(),
                field: format!("{path}.op"),
            })
        }
    };
    if !allowed.contains(&op) {
        return Err(CatalogError::UnknownOperator {
            signal: signal.to_string(),
            op: op.to_string(),
            path: path.to_string(),
        });
    }

    match op {
        "first_match" => {
            if let Some(Value::Sequence(cases)) = map.get("cases") {
                for (i, case) in cases.iter().enumerate() {
                    if let Some(when) = case.as_mapping().and_then(|c| c.get("when")) {
                        check_ops(signal, when, &format!("{path}.cases[{i}].when"), Predicate::OPS)?;
                    }
                }
            }
        }
        "and" | "or" => {
            if let Some(Value::Sequence(children)) = map.get("of") {
                for (i, child) in children.iter().enumerate() {
                    check_ops(signal, child, &format!("{path}.of[{i}]"), Predicate::OPS)?;
                }
            }
        }
        "not" => {
            if let Some(child) = map.get("of") {
                check_ops(signal, child, &format!("{path}.of"), Predicate::OPS)?;
            }
        }
        _ => {}
    }
    Ok(())
}

// ── Second pass: typed shape checks ─────────────────────────────────

fn invalid(def: &SignalDef, reason: impl Into<String>) -> CatalogError {
    CatalogError::InvalidRecipe {
        signal: def.name.clone(),
        reason: reason.into(),
    }
}

fn validate_def(def: &SignalDef) -> Result<()> {
    if def.name.is_empty() {
        return Err(CatalogError::MissingField {
            signal: "<unnamed>".to_string(),
            field: "name".to_string(),
        });
    }

    match def.signal_type {
        SignalType::Enum => {
            if def.values.is_empty() {
                return Err(CatalogError::MalformedEnum {
                    signal: def.name.clone(),
                    reason: "enum signals must declare at least one value".to_string(),
                });
            }
            let mut seen = HashSet::new();
            for v in &def.values {
                if !seen.insert(v.as_str()) {
                    return Err(CatalogError::MalformedEnum {
                        signal: def.name.clone(),
                        reason: format!("duplicate enum value '{v}'"),
                    });
                }
            }
        }
        _ if !def.values.is_empty() => {
            return Err(CatalogError::MalformedEnum {
                signal: def.name.clone(),
                reason: format!("`values` is only allowed on enum signals, not {}", def.signal_type),
            });
        }
        _ => {}
    }

    if let Some(default) = &def.default {
        if !def.accepts(default) {
            return Err(invalid(def, format!("default {default} does not fit a {} signal", def.signal_type)));
        }
    }

    validate_recipe(def)
}

fn validate_recipe(def: &SignalDef) -> Result<()> {
    match &def.derive {
        Derivation::Path { path } => check_path(def, path),
        Derivation::Flag {
            field,
            bit,
            set,
            clear,
            ..
        } => {
            check_path(def, field)?;
            check_bit(def, *bit)?;
            match def.signal_type {
                SignalType::Bool => {
                    if set.is_some() || clear.is_some() {
                        return Err(invalid(def, "`set`/`clear` labels apply to enum signals only"));
                    }
                    Ok(())
                }
                SignalType::Enum => {
                    for (key, label) in [("set", set), ("clear", clear)] {
                        match label {
                            Some(l) if def.is_member(l) => {}
                            Some(l) => {
                                return Err(invalid(def, format!("`{key}` label '{l}' is not a declared value")))
                            }
                            None => {
                                return Err(CatalogError::MissingField {
                                    signal: def.name.clone(),
                                    field: format!("derive.{key}"),
                                })
                            }
                        }
                    }
                    Ok(())
                }
                other => Err(invalid(def, format!("`flag` cannot produce a {other} signal"))),
            }
        }
        Derivation::Map {
            path,
            table,
            default,
        } => {
            check_path(def, path)?;
            if table.is_empty() {
                return Err(invalid(def, "`map` table must not be empty"));
            }
            match def.signal_type {
                SignalType::Enum => {
                    for label in table.values().chain(default.iter()) {
                        if !def.is_member(label) {
                            return Err(invalid(def, format!("map label '{label}' is not a declared value")));
                        }
                    }
                    Ok(())
                }
                SignalType::String => Ok(()),
                other => Err(invalid(def, format!("`map` cannot produce a {other} signal"))),
            }
        }
        Derivation::Recent { event, within } => {
            if def.signal_type != SignalType::Bool {
                return Err(invalid(def, "`recent` produces bool signals only"));
            }
            check_recent(def, event, *within)
        }
        Derivation::FirstMatch { cases, default } => {
            if cases.is_empty() {
                return Err(invalid(def, "`first_match` needs at least one case"));
            }
            for (i, case) in cases.iter().enumerate() {
                if !def.accepts(&case.value) {
                    return Err(invalid(
                        def,
                        format!("case {i} value {} does not fit a {} signal", case.value, def.signal_type),
                    ));
                }
                check_predicate(def, &case.when)?;
            }
            if let Some(d) = default {
                if !def.accepts(d) {
                    return Err(invalid(def, format!("first_match default {d} does not fit a {} signal", def.signal_type)));
                }
            }
            Ok(())
        }
    }
}

fn check_predicate(def: &SignalDef, predicate: &Predicate) -> Result<()> {
    match predicate {
        Predicate::Flag { field, bit, .. } => {
            check_path(def, field)?;
            check_bit(def, *bit)
        }
        Predicate::Recent { event, within } => check_recent(def, event, *within),
        Predicate::Path { path, .. } => check_path(def, path),
        Predicate::And { of } | Predicate::Or { of } => {
            if of.is_empty() {
                return Err(invalid(def, "`and`/`or` need at least one operand"));
            }
            of.iter().try_for_each(|p| check_predicate(def, p))
        }
        Predicate::Not { of } => check_predicate(def, of),
    }
}

fn check_path(def: &SignalDef, path: &str) -> Result<()> {
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(invalid(def, format!("malformed path '{path}'")));
    }
    Ok(())
}

fn check_bit(def: &SignalDef, bit: u8) -> Result<()> {
    if bit > 63 {
        return Err(invalid(def, format!("bit {bit} is out of range 0..=63")));
    }
    Ok(())
}

fn check_recent(def: &SignalDef, event: &str, within: f64) -> Result<()> {
    if event.is_empty() {
        return Err(invalid(def, "`recent` needs an event name"));
    }
    if !within.is_finite() || within <= 0.0 {
        return Err(invalid(def, format!("`within` must be a positive number of seconds, got {within}")));
    }
    Ok(())
}
