use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use shift_core::SignalValue;

/// Declared type of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Bool,
    Enum,
    Number,
    String,
    Array,
}

impl SignalType {
    pub const ALL: &'static [&'static str] = &["bool", "enum", "number", "string", "array"];
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalType::Bool => write!(f, "bool"),
            SignalType::Enum => write!(f, "enum"),
            SignalType::Number => write!(f, "number"),
            SignalType::String => write!(f, "string"),
            SignalType::Array => write!(f, "array"),
        }
    }
}

impl FromStr for SignalType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bool" | "boolean" => Ok(SignalType::Bool),
            "enum" => Ok(SignalType::Enum),
            "number" => Ok(SignalType::Number),
            "string" => Ok(SignalType::String),
            "array" => Ok(SignalType::Array),
            other => Err(format!("unknown signal type: '{}'", other)),
        }
    }
}

/// A validated signal definition. Immutable once the catalog is loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalDef {
    pub name: String,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    /// Free-form grouping label (e.g. `core`, `extended`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Enum members, in declaration order. Empty for non-enum signals.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    /// Declared default; falls back to [`SignalDef::type_default`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<SignalValue>,
    pub derive: Derivation,
}

impl SignalDef {
    /// Value substituted when derivation misses or fails.
    pub fn default_value(&self) -> SignalValue {
        self.default.clone().unwrap_or_else(|| self.type_default())
    }

    /// Type-appropriate default ignoring any declared default.
    pub fn type_default(&self) -> SignalValue {
        match self.signal_type {
            SignalType::Bool => SignalValue::Bool(false),
            SignalType::Number => SignalValue::Number(0.0),
            SignalType::String => SignalValue::Text(String::new()),
            SignalType::Array => SignalValue::List(Vec::new()),
            SignalType::Enum => {
                SignalValue::Text(self.values.first().cloned().unwrap_or_default())
            }
        }
    }

    pub fn is_member(&self, label: &str) -> bool {
        self.values.iter().any(|v| v == label)
    }

    /// Whether `value` has the shape this signal produces (and, for enums, is a member).
    pub fn accepts(&self, value: &SignalValue) -> bool {
        match (self.signal_type, value) {
            (SignalType::Bool, SignalValue::Bool(_)) => true,
            (SignalType::Number, SignalValue::Number(_)) => true,
            (SignalType::String, SignalValue::Text(_)) => true,
            (SignalType::Enum, SignalValue::Text(s)) => self.is_member(s),
            (SignalType::Array, SignalValue::List(_)) => true,
            _ => false,
        }
    }
}

/// Closed set of derivation recipes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Derivation {
    /// Dotted-path lookup, coerced to the signal type.
    Path { path: String },
    /// Test one bit of an integer bitfield.
    Flag {
        field: String,
        bit: u8,
        #[serde(default)]
        inverted: bool,
        /// Enum label when the (possibly inverted) bit is set.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        set: Option<String>,
        /// Enum label when the (possibly inverted) bit is clear.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        clear: Option<String>,
    },
    /// Translate a raw scalar to an enum label.
    Map {
        path: String,
        table: IndexMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    /// Named event seen within `within` seconds.
    Recent { event: String, within: f64 },
    /// First case whose predicate holds.
    FirstMatch {
        cases: Vec<Case>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<SignalValue>,
    },
}

impl Derivation {
    pub const OPS: &'static [&'static str] = &["path", "flag", "map", "recent", "first_match"];

    pub fn op_name(&self) -> &'static str {
        match self {
            Derivation::Path { .. } => "path",
            Derivation::Flag { .. } => "flag",
            Derivation::Map { .. } => "map",
            Derivation::Recent { .. } => "recent",
            Derivation::FirstMatch { .. } => "first_match",
        }
    }
}

/// One `first_match` arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub when: Predicate,
    pub value: SignalValue,
}

/// Boolean tests usable inside `first_match`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Flag {
        field: String,
        bit: u8,
        #[serde(default)]
        inverted: bool,
    },
    Recent {
        event: String,
        within: f64,
    },
    /// Truthy value at `path`, or equal to `equals` when given.
    Path {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        equals: Option<SignalValue>,
    },
    And {
        of: Vec<Predicate>,
    },
    Or {
        of: Vec<Predicate>,
    },
    Not {
        of: Box<Predicate>,
    },
}

impl Predicate {
    pub const OPS: &'static [&'static str] = &["flag", "recent", "path", "and", "or", "not"];
}
