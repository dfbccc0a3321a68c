//! Source cell values.
//!
//! Values are stored with an explicit type tag so a payload written to a store
//! reads back with the same types it had in the source extract.

use crate::errors::{Result, ScdError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A single cell of a source row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical representation used by the Row Hasher.
    ///
    /// Floats that hold an integral value hash like the equivalent integer,
    /// `-0.0` hashes like `0.0`, and timestamps hash as epoch milliseconds, so a
    /// source that changes its physical column type without changing the value
    /// does not register as a content change.
    pub fn canonical(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => json!(["b", b]),
            Value::Int(i) => json!(["n", i.to_string()]),
            Value::Float(f) => json!(["n", canonical_float(*f)]),
            Value::Text(s) => json!(["s", s]),
            Value::Timestamp(ts) => json!(["ts", ts.timestamp_millis()]),
        }
    }

    /// Plain JSON rendering for downstream consumers and CLI output
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(ts) => {
                serde_json::Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }

    /// JSON component of a unique key.
    ///
    /// Numbers follow the same normalization as [`Value::canonical`], so an
    /// integral float keys like the equivalent integer.
    ///
    /// ## Errors
    ///
    /// `ScdError::UnsupportedValue` for NaN and infinities
    pub fn key_part(&self, column: &str) -> Result<serde_json::Value> {
        match self {
            Value::Float(f) if !f.is_finite() => Err(ScdError::UnsupportedValue {
                column: column.to_string(),
                reason: format!("non-finite number {} cannot be part of a key", f),
            }),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => {
                Ok(serde_json::Value::from(*f as i64))
            }
            other => Ok(other.to_json()),
        }
    }

    /// Convert a plain JSON value read from an extract file.
    ///
    /// Nested arrays and objects are rejected; a source relation is flat.
    pub fn from_json(column: &str, value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Float(f))
                } else {
                    Err(ScdError::UnsupportedValue {
                        column: column.to_string(),
                        reason: format!("number {} does not fit in i64 or f64", n),
                    })
                }
            }
            serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                Err(ScdError::UnsupportedValue {
                    column: column.to_string(),
                    reason: "nested values are not supported".to_string(),
                })
            }
        }
    }
}

fn canonical_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f == 0.0 {
        return "0".to_string();
    }
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        return format!("{}", f as i64);
    }
    format!("{}", f)
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
