//! Dynamic values flowing through formulas
//!
//! Records arrive as JSON objects and computed updates leave as JSON, so
//! [`Value`] converts losslessly to and from `serde_json::Value`. Numbers are
//! held as `f64` internally so NaN can exist mid-evaluation; it leaves the
//! engine as `null`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A record: field name to value. Absent fields read as [`Value::Null`].
pub type Record = BTreeMap<String, Value>;

/// A formula value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Returns true for `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by `IF`, `AND`, `OR`, `NOT` and `CASE_WHEN`.
    ///
    /// `null`, `false`, `0`, `NaN` and the empty string are falsy; every
    /// array and object is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    /// Returns the string slice if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Lenient numeric coercion.
    ///
    /// `null`, the empty string, arrays, objects and unparsable strings give
    /// `None`; booleans map to 1/0; numeric strings are parsed after trimming.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) if n.is_nan() => None,
            Value::Number(n) => Some(*n),
            Value::String(s) => parse_number(s),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// The value as it reads back from storage: NaN and infinities, which
    /// serialize as `null`, become [`Value::Null`] at any depth.
    pub fn into_storable(self) -> Value {
        match self {
            Value::Number(n) if !n.is_finite() => Value::Null,
            Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::into_storable).collect())
            }
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, v.into_storable()))
                    .collect(),
            ),
            other => other,
        }
    }

    /// String form of the value. `null` renders as the empty string.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(Value::to_text)
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => serde_json::Value::from(self.clone()).to_string(),
        }
    }

    /// Short type label for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

/// Parses a numeric string the way a formula author expects: surrounding
/// whitespace is ignored, `Infinity` is accepted, words like `inf` or `nan`
/// are not.
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    match trimmed {
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }

    if !trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | 'e' | 'E'))
    {
        return None;
    }

    trimmed.parse::<f64>().ok().filter(|n| !n.is_nan())
}

/// Formats a number without a trailing `.0` for integral values
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        n.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::String(s) => write!(f, "\"{}\"", s),
            other => write!(f, "{}", other.to_text()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => number_to_json(n),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Integral numbers within the exact-integer range serialize as JSON integers
fn number_to_json(n: f64) -> serde_json::Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;

    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Builds a [`Record`] from a JSON object. Non-object JSON yields an empty record.
pub fn record_from_json(json: serde_json::Value) -> Record {
    match json {
        serde_json::Value::Object(map) => map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
        _ => Record::new(),
    }
}

/// Converts a [`Record`] back into a JSON object
pub fn record_to_json(record: &Record) -> serde_json::Value {
    serde_json::Value::Object(
        record
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(v.clone())))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(Value::from(" 12.5 ").to_number(), Some(12.5));
        assert_eq!(Value::from("abc").to_number(), None);
        assert_eq!(Value::from("inf").to_number(), None);
        assert_eq!(Value::from("").to_number(), None);
        assert_eq!(Value::from(true).to_number(), Some(1.0));
        assert_eq!(Value::Null.to_number(), None);
    }

    #[test]
    fn integral_numbers_serialize_as_integers() {
        let json = serde_json::to_value(Value::from(500.0)).unwrap();
        assert_eq!(json, json!(500));

        let json = serde_json::to_value(Value::from(0.25)).unwrap();
        assert_eq!(json, json!(0.25));

        let json = serde_json::to_value(Value::Number(f64::NAN)).unwrap();
        assert_eq!(json, json!(null));
    }

    #[test]
    fn non_finite_numbers_store_as_null() {
        assert_eq!(Value::Number(f64::NAN).into_storable(), Value::Null);
        assert_eq!(Value::Number(f64::NEG_INFINITY).into_storable(), Value::Null);
        assert_eq!(Value::from(2.5).into_storable(), Value::from(2.5));

        let nested = Value::Array(vec![Value::from(1), Value::Number(f64::INFINITY)]);
        let stored: Value = serde_json::from_value(serde_json::to_value(nested.clone()).unwrap()).unwrap();
        assert_eq!(nested.into_storable(), stored);
    }

    #[test]
    fn record_round_trip() {
        let record = record_from_json(json!({"qty": 10, "label": "x", "tags": ["a"]}));
        assert_eq!(record.get("qty"), Some(&Value::from(10)));
        assert_eq!(record_to_json(&record), json!({"qty": 10, "label": "x", "tags": ["a"]}));
    }

    #[test]
    fn text_forms() {
        assert_eq!(Value::from(5.0).to_text(), "5");
        assert_eq!(Value::from(0.1 + 0.2).to_text(), "0.30000000000000004");
        assert_eq!(Value::Array(vec![1.into(), "b".into()]).to_text(), "1,b");
        assert_eq!(Value::Null.to_text(), "");
    }
}
