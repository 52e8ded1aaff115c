//! Applies fired rule actions to the persistent shift bitmap.
//!
//! `set` and `clear` are idempotent bit operations resolved through the
//! [`TokenMap`]. A token the map does not know is reported and skipped; the
//! remaining actions of the pass still apply. Nothing here transmits.

use std::collections::BTreeSet;

use shift_link::{ShiftBitmap, TokenMap};
use shift_rules::{Action, Firing, RuleSet};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("rule '{rule_id}' references unknown token '{token}'")]
    UnknownToken { rule_id: String, token: String },
}

/// Receives `log` action messages.
pub trait DiagnosticSink {
    fn message(&mut self, firing: &Firing, text: &str);
}

/// Emits `log` actions as `info` tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn message(&mut self, firing: &Firing, text: &str) {
        info!(
            rule_id = %firing.rule_id,
            identity = %firing.identity,
            transition = %firing.transition,
            "{text}"
        );
    }
}

/// Outcome of applying one or more firings.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub changed: bool,
    pub applied: usize,
    pub errors: Vec<ActionError>,
}

impl ExecutionReport {
    fn merge(&mut self, other: ExecutionReport) {
        self.applied += other.applied;
        self.errors.extend(other.errors);
    }
}

/// Owner of the bitmap state.
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    tokens: TokenMap,
    bitmap: ShiftBitmap,
}

impl ActionExecutor {
    pub fn new(tokens: TokenMap) -> Self {
        Self {
            tokens,
            bitmap: ShiftBitmap::default(),
        }
    }

    /// Apply every firing in order. Later firings see the effect of earlier ones.
    /// `changed` compares the bitmap before and after the whole pass.
    pub fn apply_all(&mut self, firings: &[Firing], diagnostics: &mut dyn DiagnosticSink) -> ExecutionReport {
        let before = self.bitmap;
        let mut report = ExecutionReport::default();
        for firing in firings {
            report.merge(self.apply(firing, diagnostics));
        }
        report.changed = self.bitmap != before;
        report
    }

    /// Apply one firing's actions in list order.
    pub fn apply(&mut self, firing: &Firing, diagnostics: &mut dyn DiagnosticSink) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        let before = self.bitmap;

        for action in &firing.actions {
            match action {
                Action::Set(tokens) | Action::Clear(tokens) => {
                    let set = matches!(action, Action::Set(_));
                    for token in tokens {
                        let Some(position) = self.tokens.position(token) else {
                            let err = ActionError::UnknownToken {
                                rule_id: firing.rule_id.clone(),
                                token: token.clone(),
                            };
                            warn!(rule_id = %firing.rule_id, token = %token, "{err}, skipped");
                            report.errors.push(err);
                            continue;
                        };
                        if set {
                            self.bitmap.set(position);
                        } else {
                            self.bitmap.clear(position);
                        }
                    }
                }
                Action::Log(text) => diagnostics.message(firing, text),
            }
            report.applied += 1;
        }

        report.changed = self.bitmap != before;
        info!(
            rule_id = %firing.rule_id,
            identity = %firing.identity,
            transition = %firing.transition,
            actions = firing.actions.len(),
            changed = report.changed,
            bitmap = %self.bitmap,
            "actions applied"
        );
        report
    }

    pub fn bitmap(&self) -> ShiftBitmap {
        self.bitmap
    }

    pub fn tokens(&self) -> &TokenMap {
        &self.tokens
    }
}

/// `(rule id, token)` pairs in `rules` that `tokens` cannot resolve.
pub fn unknown_tokens(rules: &RuleSet, tokens: &TokenMap) -> Vec<(String, String)> {
    let mut missing = BTreeSet::new();
    for rule in rules.rules() {
        for action in rule.then.iter().chain(&rule.otherwise) {
            for token in action.tokens() {
                if !tokens.contains(token) {
                    missing.insert((rule.id.clone(), token.clone()));
                }
            }
        }
    }
    missing.into_iter().collect()
}
