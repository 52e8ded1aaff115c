use serde::{Deserialize, Serialize};
use std::fmt;

/// Tolerance used for numeric equality between signal values.
pub const NUMBER_EPSILON: f64 = 1e-9;

/// A derived signal value.
///
/// Raw telemetry arrives as arbitrary JSON; derivation coerces it into one of
/// these shapes according to the signal's declared type. Enum labels are
/// carried as `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<SignalValue>),
}

impl SignalValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SignalValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SignalValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SignalValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SignalValue]> {
        match self {
            SignalValue::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Short name of the value's shape, used in error messages.
    pub fn shape(&self) -> &'static str {
        match self {
            SignalValue::Bool(_) => "bool",
            SignalValue::Number(_) => "number",
            SignalValue::Text(_) => "string",
            SignalValue::List(_) => "list",
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, SignalValue::List(_))
    }

    /// Equality with an epsilon for numbers. Values of different shapes are
    /// never equal.
    pub fn loosely_equals(&self, other: &SignalValue) -> bool {
        match (self, other) {
            (SignalValue::Number(a), SignalValue::Number(b)) => (a - b).abs() <= NUMBER_EPSILON,
            (SignalValue::List(a), SignalValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_equals(y))
            }
            (a, b) => a == b,
        }
    }

    /// Convert a JSON value. `null` and objects have no signal representation.
    pub fn from_json(value: &serde_json::Value) -> Option<SignalValue> {
        match value {
            serde_json::Value::Bool(b) => Some(SignalValue::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(SignalValue::Number),
            serde_json::Value::String(s) => Some(SignalValue::Text(s.clone())),
            serde_json::Value::Array(items) => Some(SignalValue::List(
                items.iter().filter_map(SignalValue::from_json).collect(),
            )),
            serde_json::Value::Null | serde_json::Value::Object(_) => None,
        }
    }

    /// Canonical string key for a scalar: integral numbers print without a
    /// fractional part so `3` and `3.0` both map to `"3"`.
    pub fn scalar_key(&self) -> Option<String> {
        match self {
            SignalValue::Bool(b) => Some(b.to_string()),
            SignalValue::Number(n) => Some(format_number(*n)),
            SignalValue::Text(s) => Some(s.clone()),
            SignalValue::List(_) => None,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Bool(b) => write!(f, "{b}"),
            SignalValue::Number(n) => write!(f, "{}", format_number(*n)),
            SignalValue::Text(s) => write!(f, "{s}"),
            SignalValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for SignalValue {
    fn from(b: bool) -> Self {
        SignalValue::Bool(b)
    }
}

impl From<f64> for SignalValue {
    fn from(n: f64) -> Self {
        SignalValue::Number(n)
    }
}

impl From<&str> for SignalValue {
    fn from(s: &str) -> Self {
        SignalValue::Text(s.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(s: String) -> Self {
        SignalValue::Text(s)
    }
}
