//! Snapshot definitions schema, version 1

#![allow(clippy::result_large_err)]

use crate::errors::{definition_error, Result};
use crate::extract::{JsonFileExtract, SqliteSourceExtract};
use scdx_core::{DuplicateKeyPolicy, SnapshotConfig, SourceExtractProvider, TrackedColumns};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level definitions file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefinitionsFile {
    /// Must be 1
    pub schema_version: u32,
    pub snapshots: Vec<SnapshotDefinition>,
}

/// Change detection strategy; only full-row comparison is supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Check,
}

/// Where the source relation is read from. Exactly one field must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite: Option<SqliteSourceSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteSourceSpec {
    pub path: PathBuf,
    pub table: String,
}

/// One snapshot target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotDefinition {
    pub name: String,
    pub source: SourceSpec,
    pub unique_key: Vec<String>,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default = "default_check_cols")]
    pub check_cols: TrackedColumns,
    #[serde(default)]
    pub invalidate_hard_deletes: bool,
    #[serde(default)]
    pub strict_mode: bool,
    #[serde(default)]
    pub duplicate_key_policy: DuplicateKeyPolicy,
    #[serde(default = "default_reinsert")]
    pub reinsert_invalidated: bool,
}

fn default_check_cols() -> TrackedColumns {
    TrackedColumns::All
}

fn default_reinsert() -> bool {
    true
}

impl SnapshotDefinition {
    /// Reconciler configuration for this target
    pub fn config(&self) -> SnapshotConfig {
        SnapshotConfig {
            unique_key: self.unique_key.clone(),
            tracked_columns: self.check_cols.clone(),
            invalidate_hard_deletes: self.invalidate_hard_deletes,
            strict_mode: self.strict_mode,
            duplicate_key_policy: self.duplicate_key_policy,
            reinsert_invalidated: self.reinsert_invalidated,
        }
    }

    /// Build the extract provider this definition names
    pub fn provider(&self) -> Result<Box<dyn SourceExtractProvider>> {
        match (&self.source.sqlite, &self.source.json) {
            (Some(sqlite), None) => Ok(Box::new(SqliteSourceExtract::new(
                sqlite.path.clone(),
                sqlite.table.clone(),
            )?)),
            (None, Some(path)) => Ok(Box::new(JsonFileExtract::new(path.clone()))),
            _ => Err(definition_error(&format!(
                "snapshot {} must name exactly one source",
                self.name
            ))),
        }
    }
}
