//! Edge-triggered rule engine.
//!
//! Each (identity, rule) pair carries a [`MatchState`]. A pass recomputes the
//! rule's `when` clause and compares it with the stored state; actions are
//! emitted only on an edge, never for a steady state.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use shift_catalog::SignalValues;
use shift_core::Snapshot;
use tracing::{debug, info, trace};

use crate::audit_log::{AuditEntry, AuditLog};
use crate::evaluator::{evaluate, EvalContext};
use crate::ruleset::RuleSet;
use crate::schema::{Action, Rule};

/// Match-state of one rule for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchState {
    Unknown,
    False,
    True,
}

impl From<bool> for MatchState {
    fn from(matched: bool) -> Self {
        if matched {
            MatchState::True
        } else {
            MatchState::False
        }
    }
}

impl fmt::Display for MatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchState::Unknown => write!(f, "unknown"),
            MatchState::False => write!(f, "false"),
            MatchState::True => write!(f, "true"),
        }
    }
}

/// What happens when a rule's first evaluation for an identity is a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialMatch {
    /// Fire `then` once.
    #[default]
    Fire,
    /// Record the state and fire nothing.
    Baseline,
}

/// The edge that produced a [`Firing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// `unknown → true` under [`InitialMatch::Fire`].
    InitialMatch,
    /// `false → true`.
    Rising,
    /// `true → false`.
    Falling,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::InitialMatch => write!(f, "unknown->true"),
            Transition::Rising => write!(f, "false->true"),
            Transition::Falling => write!(f, "true->false"),
        }
    }
}

/// Actions selected by one rule's edge in one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Firing {
    pub rule_id: String,
    pub identity: String,
    pub transition: Transition,
    pub actions: Vec<Action>,
}

/// Per-identity edge-triggered evaluation over a [`RuleSet`].
pub struct RuleEngine {
    rules: RuleSet,
    initial: InitialMatch,
    /// identity → rule id → last matched value. Absent means `Unknown`.
    states: HashMap<String, HashMap<String, bool>>,
    audit: AuditLog,
}

impl RuleEngine {
    pub fn new(rules: RuleSet, initial: InitialMatch) -> Self {
        Self {
            rules,
            initial,
            states: HashMap::new(),
            audit: AuditLog::new(),
        }
    }

    /// Record transitions into `audit` instead of a private log.
    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    /// Advance every enabled rule for `snapshot.identity`. Firings come back
    /// in rule-list order.
    pub fn evaluate(&mut self, signals: &SignalValues, snapshot: &Snapshot) -> Vec<Firing> {
        let ctx = EvalContext::new(signals, snapshot);
        let identity = snapshot.identity.as_str();
        let states = self.states.entry(identity.to_string()).or_default();
        let mut firings = Vec::new();

        for rule in self.rules.enabled() {
            let matched = evaluate(&rule.when, &ctx);
            let previous = states
                .insert(rule.id.clone(), matched)
                .map(MatchState::from)
                .unwrap_or(MatchState::Unknown);
            let current = MatchState::from(matched);

            let Some((transition, actions)) = select_edge(rule, previous, current, self.initial) else {
                if previous == current {
                    trace!(rule_id = %rule.id, identity = %identity, state = %current, "steady state, no actions");
                } else {
                    debug!(rule_id = %rule.id, identity = %identity, from = %previous, to = %current, "baseline recorded");
                    self.audit.record(audit_entry(rule, identity, snapshot, previous, current, 0, "baseline"));
                }
                continue;
            };

            info!(
                rule_id = %rule.id,
                identity = %identity,
                transition = %transition,
                actions = actions.len(),
                "rule transition"
            );
            self.audit.record(audit_entry(
                rule,
                identity,
                snapshot,
                previous,
                current,
                actions.len(),
                &transition.to_string(),
            ));
            firings.push(Firing {
                rule_id: rule.id.clone(),
                identity: identity.to_string(),
                transition,
                actions: actions.to_vec(),
            });
        }

        firings
    }

    /// Swap in a new rule set. State survives for ids that are still present
    /// and enabled; everything else starts over from `Unknown`.
    pub fn reload(&mut self, rules: RuleSet) {
        let keep: std::collections::HashSet<&str> = rules.enabled().map(|r| r.id.as_str()).collect();
        let mut dropped = 0usize;
        for per_rule in self.states.values_mut() {
            let before = per_rule.len();
            per_rule.retain(|id, _| keep.contains(id.as_str()));
            dropped += before - per_rule.len();
        }
        info!(rules = rules.len(), dropped_states = dropped, "rule set reloaded");
        self.rules = rules;
    }

    /// Discard all match-state for `identity`.
    pub fn forget_identity(&mut self, identity: &str) -> bool {
        let removed = self.states.remove(identity).is_some();
        if removed {
            debug!(identity = %identity, "forgot identity match-state");
        }
        removed
    }

    pub fn state(&self, identity: &str, rule_id: &str) -> MatchState {
        self.states
            .get(identity)
            .and_then(|m| m.get(rule_id))
            .map(|&b| MatchState::from(b))
            .unwrap_or(MatchState::Unknown)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn initial_match(&self) -> InitialMatch {
        self.initial
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }
}

fn select_edge(
    rule: &Rule,
    previous: MatchState,
    current: MatchState,
    initial: InitialMatch,
) -> Option<(Transition, &[Action])> {
    match (previous, current) {
        (MatchState::Unknown, MatchState::True) => match initial {
            InitialMatch::Fire => Some((Transition::InitialMatch, rule.then.as_slice())),
            InitialMatch::Baseline => None,
        },
        (MatchState::False, MatchState::True) => Some((Transition::Rising, rule.then.as_slice())),
        (MatchState::True, MatchState::False) => Some((Transition::Falling, rule.otherwise.as_slice())),
        _ => None,
    }
}

fn audit_entry(
    rule: &Rule,
    identity: &str,
    snapshot: &Snapshot,
    from: MatchState,
    to: MatchState,
    actions: usize,
    message: &str,
) -> AuditEntry {
    AuditEntry {
        timestamp: snapshot.at,
        rule_id: rule.id.clone(),
        identity: identity.to_string(),
        from,
        to,
        actions,
        message: message.to_string(),
    }
}
