//! Full-table extract from a SQLite source relation.

#![allow(clippy::result_large_err)]

use crate::db;
use crate::errors::from_rusqlite;
use rusqlite::types::ValueRef;
use scdx_core::errors::{ExError, ExErrorKind, ExResult};
use scdx_core::{SourceExtractProvider, SourceRow, Value};
use std::path::{Path, PathBuf};

/// Reads every row of one table, inside a single read transaction so the
/// extract is a consistent state of the source.
#[derive(Debug, Clone)]
pub struct SqliteSourceExtract {
    path: PathBuf,
    table: String,
}

impl SqliteSourceExtract {
    /// ## Errors
    ///
    /// `ExErrorKind::InvalidConfig` when `table` is not a plain identifier.
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>) -> ExResult<Self> {
        let table = table.into();
        let valid = !table.is_empty()
            && table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        if !valid {
            return Err(ExError::new(ExErrorKind::InvalidConfig)
                .with_op("sqlite_extract")
                .with_message(format!("invalid source table name: {:?}", table)));
        }
        Ok(Self {
            path: path.into(),
            table,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn quoted_table(&self) -> String {
        self.table
            .split('.')
            .map(|part| format!("\"{}\"", part))
            .collect::<Vec<_>>()
            .join(".")
    }
}

fn to_value(column: &str, value: ValueRef<'_>) -> ExResult<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(i) => Ok(Value::Int(i)),
        ValueRef::Real(f) if f.is_finite() => Ok(Value::Float(f)),
        ValueRef::Real(f) => Err(ExError::new(ExErrorKind::InvalidInput)
            .with_column(column)
            .with_message(format!("non-finite REAL value: {}", f))),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|s| Value::Text(s.to_string()))
            .map_err(|e| {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_column(column)
                    .with_message(format!("text is not valid UTF-8: {}", e))
            }),
        ValueRef::Blob(_) => Err(ExError::new(ExErrorKind::InvalidInput)
            .with_column(column)
            .with_message("BLOB columns cannot be snapshotted")),
    }
}

impl SourceExtractProvider for SqliteSourceExtract {
    fn describe(&self) -> String {
        format!("sqlite:{}#{}", self.path.display(), self.table)
    }

    fn extract(&self) -> ExResult<Vec<SourceRow>> {
        let op = |e: ExError| e.with_op("sqlite_extract");

        let mut conn = db::open_source(&self.path).map_err(op)?;
        let tx = conn.transaction().map_err(|e| op(from_rusqlite(e)))?;

        let sql = format!("SELECT * FROM {}", self.quoted_table());
        let mut stmt = tx.prepare(&sql).map_err(|e| op(from_rusqlite(e)))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = stmt.query([]).map_err(|e| op(from_rusqlite(e)))?;
        let mut extract = Vec::new();
        while let Some(row) = rows.next().map_err(|e| op(from_rusqlite(e)))? {
            let mut source_row = SourceRow::new();
            for (i, column) in columns.iter().enumerate() {
                let value = row.get_ref(i).map_err(|e| op(from_rusqlite(e)))?;
                source_row.insert(column.clone(), to_value(column, value).map_err(op)?);
            }
            extract.push(source_row);
        }

        tracing::debug!(source = %self.describe(), rows = extract.len(), "Extracted source");
        Ok(extract)
    }
}
