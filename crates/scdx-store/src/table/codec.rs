//! Mapping between SQLite rows and snapshot types.

#![allow(clippy::result_large_err)]

use crate::errors::{corrupt_column, Result};
use chrono::{DateTime, TimeZone, Utc};
use scdx_core::reconcile::RunCounts;
use scdx_core::store::RunRecord;
use scdx_core::{CloseReason, KeyValue, SnapshotRow, SourceRow};
use scdx_core_types::RunId;

/// Column list matching [`RawVersion`]'s field order
pub const VERSION_COLUMNS: &str =
    "key, version_id, fingerprint, payload, valid_from, valid_to, close_reason, run_id";

/// Column list matching [`RawRun`]'s field order
pub const RUN_COLUMNS: &str = "snapshot_name, run_seq, run_id, run_at, inserted, updated, \
     invalidated, unchanged, skipped_invalidated, row_errors, status";

pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub fn from_millis(column: &str, ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| corrupt_column(column, format!("timestamp out of range: {}", ms)))
}

/// A versions row as stored, before decoding
pub struct RawVersion {
    key: String,
    version_id: String,
    fingerprint: String,
    payload: String,
    valid_from: i64,
    valid_to: Option<i64>,
    close_reason: Option<String>,
    run_id: String,
}

impl RawVersion {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            version_id: row.get(1)?,
            fingerprint: row.get(2)?,
            payload: row.get(3)?,
            valid_from: row.get(4)?,
            valid_to: row.get(5)?,
            close_reason: row.get(6)?,
            run_id: row.get(7)?,
        })
    }

    pub fn decode(self) -> Result<SnapshotRow> {
        let data: SourceRow =
            serde_json::from_str(&self.payload).map_err(|e| corrupt_column("payload", e))?;
        let close_reason = match self.close_reason {
            Some(reason) => Some(
                CloseReason::parse(&reason)
                    .ok_or_else(|| corrupt_column("close_reason", format!("unknown: {}", reason)))?,
            ),
            None => None,
        };
        Ok(SnapshotRow {
            key: KeyValue::from_canonical(self.key),
            version_id: self.version_id,
            fingerprint: self.fingerprint,
            data,
            valid_from: from_millis("valid_from", self.valid_from)?,
            valid_to: self
                .valid_to
                .map(|ms| from_millis("valid_to", ms))
                .transpose()?,
            close_reason,
            run_id: RunId::from_string(self.run_id),
        })
    }
}

/// Serialize a row's payload for the `payload` column
pub fn encode_payload(row: &SnapshotRow) -> Result<String> {
    serde_json::to_string(&row.data).map_err(|e| corrupt_column("payload", e))
}

/// A ledger row as stored, before decoding
pub struct RawRun {
    snapshot_name: String,
    run_seq: i64,
    run_id: String,
    run_at: i64,
    counts: [i64; 6],
    status: String,
}

impl RawRun {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            snapshot_name: row.get(0)?,
            run_seq: row.get(1)?,
            run_id: row.get(2)?,
            run_at: row.get(3)?,
            counts: [
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
            ],
            status: row.get(10)?,
        })
    }

    pub fn decode(self) -> Result<RunRecord> {
        let [inserted, updated, invalidated, unchanged, skipped_invalidated, row_errors] =
            self.counts.map(|c| c.max(0) as u64);
        Ok(RunRecord {
            run_id: RunId::from_string(self.run_id),
            snapshot_name: self.snapshot_name,
            run_seq: self.run_seq.max(0) as u64,
            run_at: from_millis("run_at", self.run_at)?,
            counts: RunCounts {
                inserted,
                updated,
                invalidated,
                unchanged,
                skipped_invalidated,
                row_errors,
            },
            status: self.status,
        })
    }
}
