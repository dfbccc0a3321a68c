//! In-memory Snapshot Table Store.
//!
//! Used for dry runs and tests. A commit works on a copy of the target's
//! versions and ledger and swaps it in only when the whole batch succeeded.

#![allow(clippy::result_large_err)]

use crate::errors::{ExError, ExResult, ScdError};
use crate::model::{CloseReason, CurrentSnapshotIndex, KeyValue, SnapshotRow};
use crate::reconcile::VersionClose;
use crate::store::{apply_batch, ApplyBatch, CommitReceipt, RunRecord, SnapshotTableStore, TableWriter};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
struct Target {
    versions: Vec<SnapshotRow>,
    runs: Vec<RunRecord>,
}

/// Snapshot table store held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryTableStore {
    targets: HashMap<String, Target>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored versions (current and closed) of a target
    pub fn version_count(&self, snapshot: &str) -> usize {
        self.targets.get(snapshot).map_or(0, |t| t.versions.len())
    }

    fn versions(&self, snapshot: &str) -> &[SnapshotRow] {
        self.targets
            .get(snapshot)
            .map(|t| t.versions.as_slice())
            .unwrap_or(&[])
    }
}

fn sort_by_key_then_time(rows: &mut [SnapshotRow]) {
    rows.sort_by(|a, b| {
        a.key
            .cmp(&b.key)
            .then_with(|| a.valid_from.cmp(&b.valid_from))
    });
}

impl SnapshotTableStore for MemoryTableStore {
    fn current_version(&self, snapshot: &str, key: &KeyValue) -> ExResult<Option<SnapshotRow>> {
        Ok(self
            .versions(snapshot)
            .iter()
            .find(|r| &r.key == key && r.is_current())
            .cloned())
    }

    fn current_versions(&self, snapshot: &str) -> ExResult<CurrentSnapshotIndex> {
        let versions = self.versions(snapshot);
        let current: Vec<SnapshotRow> = versions.iter().filter(|r| r.is_current()).cloned().collect();
        let live: HashSet<&KeyValue> = current.iter().map(|r| &r.key).collect();

        // Latest version per key decides whether a key without a current row is retired
        let mut latest: HashMap<&KeyValue, &SnapshotRow> = HashMap::new();
        for row in versions {
            let entry = latest.entry(&row.key).or_insert(row);
            if row.valid_from > entry.valid_from {
                *entry = row;
            }
        }
        let retired: Vec<KeyValue> = latest
            .into_iter()
            .filter(|(key, row)| {
                !live.contains(key) && row.close_reason == Some(CloseReason::Invalidated)
            })
            .map(|(key, _)| key.clone())
            .collect();

        Ok(CurrentSnapshotIndex::from_parts(current, retired))
    }

    fn history(&self, snapshot: &str, key: Option<&KeyValue>) -> ExResult<Vec<SnapshotRow>> {
        let mut rows: Vec<SnapshotRow> = self
            .versions(snapshot)
            .iter()
            .filter(|r| key.map_or(true, |k| &r.key == k))
            .cloned()
            .collect();
        sort_by_key_then_time(&mut rows);
        Ok(rows)
    }

    fn as_of(&self, snapshot: &str, ts: DateTime<Utc>) -> ExResult<Vec<SnapshotRow>> {
        let mut rows: Vec<SnapshotRow> = self
            .versions(snapshot)
            .iter()
            .filter(|r| r.valid_at(ts))
            .cloned()
            .collect();
        sort_by_key_then_time(&mut rows);
        Ok(rows)
    }

    fn last_run(&self, snapshot: &str) -> ExResult<Option<RunRecord>> {
        Ok(self
            .targets
            .get(snapshot)
            .and_then(|t| t.runs.last())
            .cloned())
    }

    fn list_runs(&self, snapshot: &str) -> ExResult<Vec<RunRecord>> {
        Ok(self
            .targets
            .get(snapshot)
            .map(|t| t.runs.clone())
            .unwrap_or_default())
    }

    fn commit(&mut self, batch: &ApplyBatch) -> ExResult<CommitReceipt> {
        let mut staged = self.targets.get(&batch.snapshot).cloned().unwrap_or_default();
        let receipt = apply_batch(&mut MemoryWriter { target: &mut staged }, batch)
            .map_err(|e| e.with_snapshot(batch.snapshot.clone()))?;
        self.targets.insert(batch.snapshot.clone(), staged);
        Ok(receipt)
    }
}

struct MemoryWriter<'a> {
    target: &'a mut Target,
}

impl MemoryWriter<'_> {
    fn close(&mut self, closes: &[VersionClose], ts: DateTime<Utc>, reason: CloseReason) -> ExResult<usize> {
        let mut affected = 0;
        for close in closes {
            let row = self
                .target
                .versions
                .iter_mut()
                .find(|r| r.key == close.key && r.version_id == close.version_id && r.is_current())
                .ok_or_else(|| {
                    ExError::from(ScdError::VersionNotCurrent {
                        key: close.key.to_string(),
                        version_id: close.version_id.clone(),
                    })
                })?;
            if row.valid_from >= ts {
                return Err(ScdError::NonMonotonicRun {
                    key: close.key.to_string(),
                    version_id: close.version_id.clone(),
                    valid_from: row.valid_from.to_rfc3339(),
                    run_at: ts.to_rfc3339(),
                }
                .into());
            }
            row.valid_to = Some(ts);
            row.close_reason = Some(reason);
            affected += 1;
        }
        Ok(affected)
    }
}

impl TableWriter for MemoryWriter<'_> {
    fn head_run(&mut self, _snapshot: &str) -> ExResult<Option<RunRecord>> {
        Ok(self.target.runs.last().cloned())
    }

    fn append_versions(&mut self, _snapshot: &str, rows: &[SnapshotRow]) -> ExResult<usize> {
        for row in rows {
            if self
                .target
                .versions
                .iter()
                .any(|r| r.key == row.key && r.is_current())
            {
                return Err(ScdError::DuplicateCurrent {
                    key: row.key.to_string(),
                }
                .into());
            }
            self.target.versions.push(row.clone());
        }
        Ok(rows.len())
    }

    fn close_versions(
        &mut self,
        _snapshot: &str,
        closes: &[VersionClose],
        ts: DateTime<Utc>,
    ) -> ExResult<usize> {
        self.close(closes, ts, CloseReason::Superseded)
    }

    fn hard_invalidate(
        &mut self,
        _snapshot: &str,
        closes: &[VersionClose],
        ts: DateTime<Utc>,
    ) -> ExResult<usize> {
        self.close(closes, ts, CloseReason::Invalidated)
    }

    fn record_run(&mut self, record: &RunRecord) -> ExResult<()> {
        self.target.runs.push(record.clone());
        Ok(())
    }
}
