//! The signal catalog: a validated, ordered registry of signal definitions.

mod builder;
mod types;

#[cfg(test)]
mod tests;

use indexmap::IndexMap;
use shift_core::SignalValue;

use crate::error::ReferenceError;
use crate::fuzzy::fuzzy_match;

pub use self::types::{Case, Derivation, Predicate, SignalDef, SignalType};

/// Prefix whose paths fall back to the snapshot root on a miss.
pub const DEFAULT_FALLBACK_PREFIX: &str = "state";

/// Loaded signal definitions keyed by name, in declaration order.
///
/// Construct with [`Catalog::from_yaml`], [`Catalog::load`] or
/// [`Catalog::from_defs`]; all of them validate every recipe first, so a
/// catalog that exists is well-formed.
#[derive(Debug, Clone)]
pub struct Catalog {
    signals: IndexMap<String, SignalDef>,
    fallback_prefix: String,
}

impl Catalog {
    pub fn get(&self, name: &str) -> Option<&SignalDef> {
        self.signals.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.signals.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignalDef> {
        self.signals.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.signals.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn fallback_prefix(&self) -> &str {
        &self.fallback_prefix
    }

    /// Closest known signal name to `name`.
    pub fn suggest(&self, name: &str) -> Option<&str> {
        fuzzy_match(name, self.names())
    }

    /// Check that a rule may reference `name`, optionally compared against `value`.
    ///
    /// Enum signals require `value` to be a declared member; every other type
    /// requires a value of the matching shape. List values are not accepted
    /// here, callers check list members one by one.
    pub fn validate_reference(
        &self,
        name: &str,
        value: Option<&SignalValue>,
    ) -> Result<&SignalDef, ReferenceError> {
        let def = self.get(name).ok_or_else(|| ReferenceError::UnknownSignal {
            name: name.to_string(),
            suggestion: self.suggest(name).map(str::to_string),
        })?;

        let Some(value) = value else {
            return Ok(def);
        };

        match (def.signal_type, value) {
            (SignalType::Enum, SignalValue::Text(label)) => {
                if def.is_member(label) {
                    Ok(def)
                } else {
                    Err(ReferenceError::NotEnumMember {
                        signal: def.name.clone(),
                        value: label.clone(),
                        suggestion: fuzzy_match(label, def.values.iter().map(String::as_str))
                            .map(str::to_string),
                    })
                }
            }
            // Array signals are compared against their scalar elements.
            (SignalType::Array, v) if v.is_scalar() => Ok(def),
            (_, v) if def.accepts(v) => Ok(def),
            (expected, v) => Err(ReferenceError::TypeMismatch {
                signal: def.name.clone(),
                expected,
                found: v.shape(),
            }),
        }
    }
}
