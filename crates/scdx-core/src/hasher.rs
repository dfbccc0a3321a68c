//! Row Hasher: check-strategy fingerprints over tracked columns.
//!
//! A fingerprint is the hex SHA-256 of a canonical JSON rendering of the
//! tracked cells. Columns are visited in name order and each value is
//! rendered through `Value::canonical`, so:
//!
//! - the same tracked content always produces the same fingerprint
//! - column order in the extract never matters
//! - `1`, `1.0` and `-0.0`/`0.0` hash as the same number
//!
//! NULL cells are left out of the rendering, so a column that is absent and a
//! column that is NULL are indistinguishable.

use crate::errors::{Result, ScdError};
use crate::model::{KeyValue, SourceRow, TrackedColumns, Value};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use sha2::{Digest, Sha256};

/// Compute the fingerprint of one row.
///
/// ## Errors
///
/// - `ScdError::MissingColumn` when an explicitly tracked column is not part
///   of the row
/// - `ScdError::UnsupportedValue` when any cell, tracked or not, is NaN or an
///   infinity; such a row cannot be stored
pub fn compute_fingerprint(
    row: &SourceRow,
    tracked: &TrackedColumns,
    unique_key: &[String],
) -> Result<String> {
    let non_finite = row.iter().find_map(|(column, value)| match value {
        Value::Float(f) if !f.is_finite() => Some((column, *f)),
        _ => None,
    });
    if let Some((column, f)) = non_finite {
        return Err(ScdError::UnsupportedValue {
            column: column.to_string(),
            reason: format!("non-finite number {} cannot be stored", f),
        });
    }

    let mut cells = serde_json::Map::new();
    match tracked {
        TrackedColumns::All => {
            for (column, value) in row.iter() {
                if unique_key.iter().any(|k| k == column) || value.is_null() {
                    continue;
                }
                cells.insert(column.to_string(), value.canonical());
            }
        }
        TrackedColumns::Columns(columns) => {
            for column in columns {
                let value = row.get(column).ok_or_else(|| ScdError::MissingColumn {
                    column: column.clone(),
                })?;
                if !value.is_null() {
                    cells.insert(column.clone(), value.canonical());
                }
            }
        }
    }

    // serde_json's Map is ordered by key without the preserve_order feature
    let canonical = serde_json::to_string(&serde_json::Value::Object(cells))?;
    Ok(hash_string(&canonical))
}

/// Fingerprint a whole extract in parallel.
///
/// Results come back in input order, one per row.
pub fn fingerprint_extract(
    rows: &[SourceRow],
    tracked: &TrackedColumns,
    unique_key: &[String],
) -> Vec<Result<String>> {
    rows.par_iter()
        .map(|row| compute_fingerprint(row, tracked, unique_key))
        .collect()
}

/// Identify one version of a key.
///
/// Includes `valid_from`, so a key returning to an earlier content state still
/// gets a fresh id, while a rerun at the same timestamp reproduces it.
pub fn compute_version_id(key: &KeyValue, fingerprint: &str, valid_from: DateTime<Utc>) -> String {
    let material = format!(
        "{}\u{1f}{}\u{1f}{}",
        key.as_str(),
        fingerprint,
        valid_from.timestamp_millis()
    );
    hash_string(&material)
}

/// Hash a string to hex SHA-256
pub fn hash_string(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}
