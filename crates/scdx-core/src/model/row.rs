//! Source rows and unique keys.

use crate::errors::{Result, ScdError};
use crate::model::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of the current state of the source relation.
///
/// Columns are kept in a `BTreeMap`, so two rows with the same cells compare
/// and serialize identically whatever order the extract produced them in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRow(BTreeMap<String, Value>);

impl SourceRow {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert, handy for tests and providers
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build a row from a flat JSON object
    pub fn from_json_object(object: &serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let mut row = SourceRow::new();
        for (column, value) in object {
            row.insert(column.clone(), Value::from_json(column, value)?);
        }
        Ok(row)
    }

    /// Plain JSON object rendering (untagged values)
    pub fn to_json(&self) -> serde_json::Value {
        let object: serde_json::Map<String, serde_json::Value> = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(object)
    }
}

impl FromIterator<(String, Value)> for SourceRow {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Canonical unique-key value of a row.
///
/// The key is the compact JSON array of the key columns' values in configured
/// key order, e.g. `[1]` or `["eu",42]`. That string is what stores index on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyValue(String);

impl KeyValue {
    /// Project the unique key out of a row.
    ///
    /// ## Errors
    ///
    /// - `ScdError::MissingColumn` if a key column is absent from the row
    /// - `ScdError::NullKey` if a key column holds NULL
    /// - `ScdError::UnsupportedValue` if a key column holds NaN or an infinity
    pub fn from_row(row: &SourceRow, unique_key: &[String]) -> Result<Self> {
        let mut parts = Vec::with_capacity(unique_key.len());
        for column in unique_key {
            match row.get(column) {
                None => {
                    return Err(ScdError::MissingColumn {
                        column: column.clone(),
                    })
                }
                Some(Value::Null) => {
                    return Err(ScdError::NullKey {
                        column: column.clone(),
                    })
                }
                Some(value) => parts.push(value.key_part(column)?),
            }
        }
        Ok(Self(serde_json::to_string(&parts)?))
    }

    /// Wrap an already-canonical key (as read back from a store)
    pub fn from_canonical(canonical: impl Into<String>) -> Self {
        Self(canonical.into())
    }

    /// Parse a user-supplied key such as `1`, `"a"` or `["eu", 42]`.
    ///
    /// Scalars are treated as single-column keys.
    pub fn parse(input: &str) -> Result<Self> {
        let parsed: serde_json::Value = serde_json::from_str(input)?;
        let parts = match parsed {
            serde_json::Value::Array(parts) => parts,
            scalar => vec![scalar],
        };
        if parts.iter().any(|p| p.is_null() || p.is_array() || p.is_object()) {
            return Err(ScdError::InvalidConfig {
                reason: format!("key {} must be a list of scalar values", input),
            });
        }
        let parts = parts
            .iter()
            .map(|p| Value::from_json("key", p)?.key_part("key"))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(serde_json::to_string(&parts)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for KeyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
