//! Snapshot configuration surface consumed by the Reconciler.

use crate::errors::{Result, ScdError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which columns participate in change detection.
///
/// Serialized as the keyword `all` or as a list of column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTrackedColumns", into = "RawTrackedColumns")]
pub enum TrackedColumns {
    /// Every column of the row except the unique key columns
    All,
    /// Exactly these columns
    Columns(Vec<String>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawTrackedColumns {
    Keyword(String),
    List(Vec<String>),
}

impl TryFrom<RawTrackedColumns> for TrackedColumns {
    type Error = String;

    fn try_from(raw: RawTrackedColumns) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawTrackedColumns::Keyword(k) if k == "all" => Ok(TrackedColumns::All),
            RawTrackedColumns::Keyword(k) => Err(format!(
                "tracked columns must be 'all' or a list of columns, got '{}'",
                k
            )),
            RawTrackedColumns::List(cols) => Ok(TrackedColumns::Columns(cols)),
        }
    }
}

impl From<TrackedColumns> for RawTrackedColumns {
    fn from(tracked: TrackedColumns) -> Self {
        match tracked {
            TrackedColumns::All => RawTrackedColumns::Keyword("all".to_string()),
            TrackedColumns::Columns(cols) => RawTrackedColumns::List(cols),
        }
    }
}

/// Resolution for two extract rows sharing a unique key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// Report every repeated occurrence and leave the key out of the run
    #[default]
    Reject,
    /// First occurrence in extract order wins
    KeepFirst,
    /// Last occurrence in extract order wins
    KeepLast,
}

/// Per-target reconciliation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    pub unique_key: Vec<String>,
    #[serde(default = "default_tracked")]
    pub tracked_columns: TrackedColumns,
    #[serde(default)]
    pub invalidate_hard_deletes: bool,
    #[serde(default)]
    pub strict_mode: bool,
    #[serde(default)]
    pub duplicate_key_policy: DuplicateKeyPolicy,
    /// Whether a key closed by hard-delete invalidation may come back as a fresh version
    #[serde(default = "default_true")]
    pub reinsert_invalidated: bool,
}

fn default_tracked() -> TrackedColumns {
    TrackedColumns::All
}

fn default_true() -> bool {
    true
}

impl SnapshotConfig {
    /// Config with check-all tracking, soft deletes, lenient mode, rejecting duplicates
    pub fn new(unique_key: Vec<String>) -> Self {
        Self {
            unique_key,
            tracked_columns: TrackedColumns::All,
            invalidate_hard_deletes: false,
            strict_mode: false,
            duplicate_key_policy: DuplicateKeyPolicy::Reject,
            reinsert_invalidated: true,
        }
    }

    pub fn with_tracked_columns(mut self, columns: Vec<String>) -> Self {
        self.tracked_columns = TrackedColumns::Columns(columns);
        self
    }

    pub fn with_invalidate_hard_deletes(mut self, enabled: bool) -> Self {
        self.invalidate_hard_deletes = enabled;
        self
    }

    pub fn with_strict_mode(mut self, enabled: bool) -> Self {
        self.strict_mode = enabled;
        self
    }

    pub fn with_duplicate_key_policy(mut self, policy: DuplicateKeyPolicy) -> Self {
        self.duplicate_key_policy = policy;
        self
    }

    pub fn with_reinsert_invalidated(mut self, enabled: bool) -> Self {
        self.reinsert_invalidated = enabled;
        self
    }

    /// Check the configuration itself, independent of any data.
    ///
    /// ## Errors
    ///
    /// `ScdError::InvalidConfig` when the unique key is empty or repeats a
    /// column, or when an explicit tracked column list is empty, repeats a
    /// column, or names a unique key column.
    pub fn validate(&self) -> Result<()> {
        if self.unique_key.is_empty() {
            return Err(invalid("unique_key must name at least one column"));
        }
        let mut seen = HashSet::new();
        for column in &self.unique_key {
            if column.is_empty() {
                return Err(invalid("unique_key contains an empty column name"));
            }
            if !seen.insert(column.as_str()) {
                return Err(invalid(&format!("unique_key repeats column {}", column)));
            }
        }

        if let TrackedColumns::Columns(columns) = &self.tracked_columns {
            if columns.is_empty() {
                return Err(invalid("tracked column list is empty; use 'all'"));
            }
            let mut tracked = HashSet::new();
            for column in columns {
                if self.unique_key.contains(column) {
                    return Err(invalid(&format!(
                        "column {} is part of the unique key and cannot be tracked",
                        column
                    )));
                }
                if !tracked.insert(column.as_str()) {
                    return Err(invalid(&format!("tracked columns repeat {}", column)));
                }
            }
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> ScdError {
    ScdError::InvalidConfig {
        reason: reason.to_string(),
    }
}
