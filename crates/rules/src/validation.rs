//! Rule validation against a loaded signal catalog.
//!
//! Every condition must reference a known signal with a value of the right
//! shape for its operator. Returns a [`ValidationResult`] with errors (the
//! rule cannot be loaded) and warnings (advisory).

mod action_checks;
mod condition_checks;


use serde::{Deserialize, Serialize};
use shift_catalog::Catalog;

use crate::schema::Rule;

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A blocking validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    /// Location within the rule, e.g. `"when.all[0].value"`.
    pub path: String,
    pub message: String,
    /// Optional "Did you mean …?" suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// A non-blocking advisory warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        });
    }

    fn error_with_suggestion(
        &mut self,
        path: impl Into<String>,
        message: impl Into<String>,
        suggestion: Option<String>,
    ) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion,
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }

    /// All errors on one line, suggestions included.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| match &e.suggestion {
                Some(s) => format!("{}: {} (did you mean '{}'?)", e.path, e.message, s),
                None => format!("{}: {}", e.path, e.message),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Validate a parsed [`Rule`] against `catalog`.
pub fn validate_rule(rule: &Rule, catalog: &Catalog) -> ValidationResult {
    let mut result = ValidationResult::new();
    validate_identity(rule, &mut result);
    condition_checks::validate_node(&rule.when, "when", catalog, &mut result);
    action_checks::validate_actions(rule, &mut result);
    result
}

fn validate_identity(rule: &Rule, result: &mut ValidationResult) {
    if rule.id.trim().is_empty() {
        result.error("id", "rule id must not be empty");
    } else if !is_kebab_case(&rule.id) {
        result.warn(
            "id",
            format!("id should be kebab-case (lowercase alphanumeric + hyphens), got '{}'", rule.id),
        );
    }
}

/// Check if a string is valid kebab-case: lowercase alphanumeric + hyphens,
/// no leading/trailing/consecutive hyphens.
pub(crate) fn is_kebab_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('-') || s.ends_with('-') || s.contains("--") {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
