//! Apply plans produced by the Reconciler.

use crate::model::{KeyValue, SnapshotRow};
use serde::{Deserialize, Serialize};

/// Close the named current version of a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionClose {
    pub key: KeyValue,
    pub version_id: String,
}

/// The writes of one run, in apply order.
///
/// Closes come before invalidations and appends so the table never holds two
/// current versions of a key, even between statements.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyPlan {
    /// Versions superseded by a changed row
    pub closes: Vec<VersionClose>,
    /// Versions whose key disappeared from the source
    pub invalidations: Vec<VersionClose>,
    /// New current versions (inserts and the new side of updates)
    pub appends: Vec<SnapshotRow>,
}

impl ApplyPlan {
    pub fn is_empty(&self) -> bool {
        self.closes.is_empty() && self.invalidations.is_empty() && self.appends.is_empty()
    }

    /// Total row writes the plan performs
    pub fn write_count(&self) -> usize {
        self.closes.len() + self.invalidations.len() + self.appends.len()
    }
}

/// Outcome counts of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub inserted: u64,
    pub updated: u64,
    pub invalidated: u64,
    pub unchanged: u64,
    /// Rows for keys retired by invalidation while re-insertion is disabled
    pub skipped_invalidated: u64,
    pub row_errors: u64,
}
