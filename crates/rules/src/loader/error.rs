//! Error types and load result structures for the rule loader.

use std::fmt;

/// Errors that can occur during rule loading.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Document-level structure error (e.g. `rules` is not a list).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A rule failed to parse or validate and the policy rejects the whole set.
    #[error("rule '{rule_id}' is invalid: {reason}")]
    InvalidRule { rule_id: String, reason: String },

    /// Filesystem watcher error.
    #[error("Notify watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Result alias for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;

/// Outcome of loading a single rule.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadResult {
    /// Rule id, or `#<index>` when the entry has no usable id.
    pub rule_id: String,
    pub status: LoadStatus,
}

impl LoadResult {
    pub(crate) fn failed(rule_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            status: LoadStatus::Failed {
                error: error.into(),
            },
        }
    }
}

/// Status of a single rule load attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    /// Rule parsed, validated and is active.
    Loaded,
    /// Rule is valid but `enabled: false`.
    Disabled,
    /// Parse or validation error occurred.
    Failed { error: String },
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStatus::Loaded => write!(f, "loaded"),
            LoadStatus::Disabled => write!(f, "disabled"),
            LoadStatus::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}
