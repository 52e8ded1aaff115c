//! Edge-triggered rule engine for shift-bridge.
//!
//! This crate provides:
//! - YAML rule definitions with serde deserialization
//! - A rule file loader with hot-reload via `notify` watcher
//! - Rule validation against the signal catalog, with "did you mean" hints
//! - An all/any condition evaluator over derived signals
//! - Per-identity match-state tracking that fires actions only on edges
//! - An in-memory audit log of transitions

pub mod audit_log;
pub mod engine;
pub mod evaluator;
pub mod loader;
pub mod ruleset;
pub mod schema;
pub mod validation;

pub use audit_log::{AuditEntry, AuditLog, AuditQuery};
pub use engine::{Firing, InitialMatch, MatchState, RuleEngine, Transition};
pub use evaluator::{evaluate, EvalContext};
pub use loader::{parse_rules, LoadResult, LoadStatus, ParsedRules, RuleError, RuleLoader};
pub use ruleset::{OnInvalidRule, RuleSet};
pub use schema::{Action, Condition, ConditionGroup, ConditionNode, Operator, Rule, RuleFile};
pub use validation::{validate_rule, ValidationResult};
