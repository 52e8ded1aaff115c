//! YAML DSL schema types with serde deserialization.
//!
//! Defines the rule file hierarchy:
//! - `RuleFile`: the `rules:` list, in application order
//! - `Rule`: id, title, enabled flag, `when` clause, `then`/`else` actions
//! - `ConditionNode`: nested `all`/`any` groups over leaf `Condition`s
//! - `Action`: `set`/`clear` bitmap tokens or `log` a message

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shift_core::SignalValue;


// ── Rule file ───────────────────────────────────────────────────────

/// Top-level rules document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleFile {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// A single user-authored rule.
///
/// `id` keys the rule's match-state; renaming it resets history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub when: ConditionNode,
    /// Applied on a rising edge.
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "serde_yaml::with::singleton_map_recursive"
    )]
    pub then: Vec<Action>,
    /// Applied on a falling edge.
    #[serde(
        rename = "else",
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "serde_yaml::with::singleton_map_recursive"
    )]
    pub otherwise: Vec<Action>,
}

fn default_true() -> bool {
    true
}

impl Rule {
    /// Title for log lines, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }

    /// Every leaf condition, depth first.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.when.collect_leaves(&mut out);
        out
    }
}

// ── Conditions ──────────────────────────────────────────────────────

/// A group or a leaf. Groups are tried first so `{all: [...]}` never parses
/// as a leaf.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConditionNode {
    Group(ConditionGroup),
    Leaf(Condition),
}

impl ConditionNode {
    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        match self {
            ConditionNode::Leaf(c) => out.push(c),
            ConditionNode::Group(g) => g.members().iter().for_each(|n| n.collect_leaves(out)),
        }
    }
}

/// Boolean group. Empty `all` is true; empty `any` is false.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConditionGroup {
    All(Vec<ConditionNode>),
    Any(Vec<ConditionNode>),
}

impl ConditionGroup {
    pub fn members(&self) -> &[ConditionNode] {
        match self {
            ConditionGroup::All(m) | ConditionGroup::Any(m) => m,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            ConditionGroup::All(_) => "all",
            ConditionGroup::Any(_) => "any",
        }
    }
}

/// Leaf test against one derived signal, or an event window for `recent`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    pub op: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<SignalValue>,
    /// Event name (for `recent`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Window in seconds (for `recent`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within: Option<f64>,
}

impl Condition {
    pub fn new(signal: impl Into<String>, op: Operator, value: Option<SignalValue>) -> Self {
        Self {
            signal: Some(signal.into()),
            op,
            value,
            event: None,
            within: None,
        }
    }

    pub fn recent(event: impl Into<String>, within: f64) -> Self {
        Self {
            signal: None,
            op: Operator::Recent,
            value: None,
            event: Some(event.into()),
            within: Some(within),
        }
    }
}

/// Closed operator set for leaf conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Ne,
    In,
    Nin,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    Exists,
    Recent,
}

impl Operator {
    pub const ALL: &'static [&'static str] = &[
        "eq", "ne", "in", "nin", "lt", "lte", "gt", "gte", "contains", "exists", "recent",
    ];

    pub fn is_ordering(&self) -> bool {
        matches!(self, Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte)
    }

    pub fn is_membership(&self) -> bool {
        matches!(self, Operator::In | Operator::Nin)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::In => "in",
            Operator::Nin => "nin",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Contains => "contains",
            Operator::Exists => "exists",
            Operator::Recent => "recent",
        };
        f.write_str(s)
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "eq" => Ok(Operator::Eq),
            "ne" => Ok(Operator::Ne),
            "in" => Ok(Operator::In),
            "nin" => Ok(Operator::Nin),
            "lt" => Ok(Operator::Lt),
            "lte" => Ok(Operator::Lte),
            "gt" => Ok(Operator::Gt),
            "gte" => Ok(Operator::Gte),
            "contains" => Ok(Operator::Contains),
            "exists" => Ok(Operator::Exists),
            "recent" => Ok(Operator::Recent),
            other => Err(format!("unknown operator: '{}'", other)),
        }
    }
}

// ── Actions ─────────────────────────────────────────────────────────

/// One step of a `then`/`else` list, written as a single-key map
/// (`- set: [Shift1]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Turn bitmap tokens on.
    Set(Vec<String>),
    /// Turn bitmap tokens off.
    Clear(Vec<String>),
    /// Emit a diagnostic message.
    Log(String),
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Set(_) => "set",
            Action::Clear(_) => "clear",
            Action::Log(_) => "log",
        }
    }

    pub fn tokens(&self) -> &[String] {
        match self {
            Action::Set(t) | Action::Clear(t) => t,
            Action::Log(_) => &[],
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Set(t) => write!(f, "set [{}]", t.join(", ")),
            Action::Clear(t) => write!(f, "clear [{}]", t.join(", ")),
            Action::Log(m) => write!(f, "log \"{m}\""),
        }
    }
}
