//! # Driver value union
//!
//! Adapters hand rows to the shaper as maps from column alias to [`Value`].
//! The union mirrors what the two supported drivers can actually produce:
//! SQLite has no native booleans, decimals, or timestamps, so those arrive as
//! integers and text; PostgreSQL drivers return typed values.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Number;

/// A single row as returned by an adapter, keyed by column alias.
///
/// Insertion order is the column order of the statement, which is why this is
/// an [`IndexMap`] rather than a hash map.
pub type Row = IndexMap<String, Value>;

/// Tagged union of every value an adapter may bind or return.
///
/// Decimals travel as strings (`DecimalStr`) end to end; they are never
/// represented as floats.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    DecimalStr(String),
    String(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Converts a JSON value into the closest driver value.
    ///
    /// Used by the batch demultiplexer, where rows come back JSON-encoded and
    /// every scalar has lost its driver type.
    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int64(i)
                } else {
                    Value::Float64(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            other => Value::Json(other.clone()),
        }
    }

    /// Renders the value as plain JSON without any type-directed coercion.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int64(i) => serde_json::Value::Number(Number::from(i)),
            Value::Float64(f) => Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::DecimalStr(s) | Value::String(s) => serde_json::Value::String(s),
            Value::Bytes(b) => serde_json::Value::String(hex::encode(b)),
            Value::DateTime(dt) => serde_json::Value::String(
                dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            ),
            Value::Json(v) => v,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}
