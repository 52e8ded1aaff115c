use thiserror::Error;

use crate::catalog::SignalType;

/// Load-time catalog failure. Any of these aborts the whole load.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("duplicate signal name '{0}'")]
    DuplicateName(String),

    #[error("signal '{signal}' is missing required field `{field}`")]
    MissingField { signal: String, field: String },

    #[error("signal '{signal}' has unknown type '{type_name}'")]
    UnknownType { signal: String, type_name: String },

    #[error("signal '{signal}' uses unknown operator '{op}' at `{path}`")]
    UnknownOperator {
        signal: String,
        op: String,
        path: String,
    },

    #[error("signal '{signal}' has a malformed enum value list: {reason}")]
    MalformedEnum { signal: String, reason: String },

    #[error("signal '{signal}' has an invalid recipe: {reason}")]
    InvalidRecipe { signal: String, reason: String },
}

/// Result alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// A reference to a signal (from a rule condition) that the catalog cannot satisfy.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReferenceError {
    #[error("unknown signal '{name}'")]
    UnknownSignal {
        name: String,
        suggestion: Option<String>,
    },

    #[error("'{value}' is not a declared value of enum signal '{signal}'")]
    NotEnumMember {
        signal: String,
        value: String,
        suggestion: Option<String>,
    },

    #[error("signal '{signal}' is {expected}, got a {found} value")]
    TypeMismatch {
        signal: String,
        expected: SignalType,
        found: &'static str,
    },
}

impl ReferenceError {
    /// "Did you mean …?" hint, when one exists.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            ReferenceError::UnknownSignal { suggestion, .. }
            | ReferenceError::NotEnumMember { suggestion, .. } => suggestion.as_deref(),
            ReferenceError::TypeMismatch { .. } => None,
        }
    }
}

/// A per-signal derivation failure. Recovered by substituting the default.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DeriveError {
    #[error("field '{field}' is not an integer bitfield (found {found})")]
    NotABitfield { field: String, found: String },

    #[error("cannot coerce {found} to {expected}")]
    TypeMismatch {
        expected: SignalType,
        found: String,
    },

    #[error("'{value}' is not a declared enum value")]
    NotEnumMember { value: String },
}
