//! SQLite implementation of `SnapshotTableStore`.

#![allow(clippy::result_large_err)]

use crate::db;
use crate::errors::{from_rusqlite, Result};
use crate::migrations::apply_migrations;
use crate::table::codec::{
    encode_payload, to_millis, RawRun, RawVersion, RUN_COLUMNS, VERSION_COLUMNS,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use scdx_core::errors::{ExError, ExResult};
use scdx_core::reconcile::VersionClose;
use scdx_core::store::{
    apply_batch, ApplyBatch, CommitReceipt, RunRecord, SnapshotTableStore, TableWriter,
    TargetState,
};
use scdx_core::{CloseReason, CurrentSnapshotIndex, KeyValue, SnapshotRow};
use std::path::Path;

/// Snapshot table store over one SQLite connection.
///
/// Several stores may point at the same database file; the run ledger
/// serializes their commits.
pub struct SqliteTableStore {
    conn: Connection,
}

impl SqliteTableStore {
    /// Open (creating if needed), configure and migrate a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut conn = db::open_target(path)?;
        apply_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    /// Fresh in-memory database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = db::open_in_memory()?;
        apply_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    /// Names of every target with at least one stored version or run
    pub fn snapshot_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT snapshot_name FROM snapshot_versions
                 UNION SELECT snapshot_name FROM snapshot_runs
                 ORDER BY 1",
            )
            .map_err(from_rusqlite)?;
        let names = stmt
            .query_map([], |row| row.get(0))
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(from_rusqlite)?;
        Ok(names)
    }

    fn query_versions(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<SnapshotRow>> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(from_rusqlite)?;
        let raw = stmt
            .query_map(params, RawVersion::from_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        raw.into_iter().map(RawVersion::decode).collect()
    }
}

fn query_head(conn: &Connection, snapshot: &str) -> Result<Option<RunRecord>> {
    let sql = format!(
        "SELECT {} FROM snapshot_runs WHERE snapshot_name = ?1 ORDER BY run_seq DESC LIMIT 1",
        RUN_COLUMNS
    );
    conn.query_row(&sql, [snapshot], RawRun::from_row)
        .optional()
        .map_err(from_rusqlite)?
        .map(RawRun::decode)
        .transpose()
}

impl SnapshotTableStore for SqliteTableStore {
    fn current_version(&self, snapshot: &str, key: &KeyValue) -> ExResult<Option<SnapshotRow>> {
        let sql = format!(
            "SELECT {} FROM snapshot_versions
             WHERE snapshot_name = ?1 AND key = ?2 AND valid_to IS NULL",
            VERSION_COLUMNS
        );
        let mut rows = self.query_versions(&sql, &[&snapshot, &key.as_str()])?;
        Ok(rows.pop())
    }

    fn current_versions(&self, snapshot: &str) -> ExResult<CurrentSnapshotIndex> {
        let sql = format!(
            "SELECT {} FROM snapshot_versions WHERE snapshot_name = ?1 AND valid_to IS NULL",
            VERSION_COLUMNS
        );
        let current = self.query_versions(&sql, &[&snapshot])?;

        // A key is retired when its latest version was closed by invalidation
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT v.key FROM snapshot_versions v
                 WHERE v.snapshot_name = ?1
                   AND v.close_reason = 'invalidated'
                   AND v.valid_from = (
                       SELECT MAX(w.valid_from) FROM snapshot_versions w
                       WHERE w.snapshot_name = v.snapshot_name AND w.key = v.key
                   )",
            )
            .map_err(from_rusqlite)?;
        let retired = stmt
            .query_map([snapshot], |row| row.get::<_, String>(0))
            .map_err(from_rusqlite)?
            .map(|k| k.map(KeyValue::from_canonical))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;

        tracing::debug!(
            snapshot,
            current = current.len(),
            retired = retired.len(),
            "Loaded current snapshot index"
        );
        Ok(CurrentSnapshotIndex::from_parts(current, retired))
    }

    fn history(&self, snapshot: &str, key: Option<&KeyValue>) -> ExResult<Vec<SnapshotRow>> {
        match key {
            Some(key) => {
                let sql = format!(
                    "SELECT {} FROM snapshot_versions
                     WHERE snapshot_name = ?1 AND key = ?2 ORDER BY valid_from",
                    VERSION_COLUMNS
                );
                self.query_versions(&sql, &[&snapshot, &key.as_str()])
            }
            None => {
                let mut rows = {
                    let sql = format!(
                        "SELECT {} FROM snapshot_versions WHERE snapshot_name = ?1",
                        VERSION_COLUMNS
                    );
                    self.query_versions(&sql, &[&snapshot])?
                };
                // KeyValue ordering, not SQLite collation
                rows.sort_by(|a, b| a.key.cmp(&b.key).then(a.valid_from.cmp(&b.valid_from)));
                Ok(rows)
            }
        }
    }

    fn as_of(&self, snapshot: &str, ts: DateTime<Utc>) -> ExResult<Vec<SnapshotRow>> {
        let sql = format!(
            "SELECT {} FROM snapshot_versions
             WHERE snapshot_name = ?1
               AND valid_from <= ?2
               AND (valid_to IS NULL OR valid_to > ?2)",
            VERSION_COLUMNS
        );
        let mut rows = self.query_versions(&sql, &[&snapshot, &to_millis(ts)])?;
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(rows)
    }

    fn last_run(&self, snapshot: &str) -> ExResult<Option<RunRecord>> {
        query_head(&self.conn, snapshot)
    }

    fn current_state(&self, snapshot: &str) -> ExResult<TargetState> {
        // One read transaction pins a WAL snapshot for both queries
        let tx = self.conn.unchecked_transaction().map_err(from_rusqlite)?;
        let head_run_seq = query_head(&tx, snapshot)?.map_or(0, |r| r.run_seq);
        let index = self.current_versions(snapshot)?;
        tx.commit().map_err(from_rusqlite)?;
        Ok(TargetState {
            index,
            head_run_seq,
        })
    }

    fn list_runs(&self, snapshot: &str) -> ExResult<Vec<RunRecord>> {
        let sql = format!(
            "SELECT {} FROM snapshot_runs WHERE snapshot_name = ?1 ORDER BY run_seq",
            RUN_COLUMNS
        );
        let mut stmt = self.conn.prepare_cached(&sql).map_err(from_rusqlite)?;
        let raw = stmt
            .query_map([snapshot], RawRun::from_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        raw.into_iter().map(RawRun::decode).collect()
    }

    fn commit(&mut self, batch: &ApplyBatch) -> ExResult<CommitReceipt> {
        let with_context = |e: ExError| {
            e.with_op("commit")
                .with_snapshot(batch.snapshot.clone())
                .with_run_id(batch.run_id.clone())
        };

        // IMMEDIATE takes the write lock up front so the ledger read below
        // cannot be invalidated by another writer before we commit.
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| with_context(from_rusqlite(e)))?;

        let receipt = apply_batch(&mut SqliteWriter { tx: &tx }, batch).map_err(with_context)?;

        // Dropping `tx` on an error above rolls everything back
        tx.commit().map_err(|e| with_context(from_rusqlite(e)))?;

        tracing::debug!(
            snapshot = %batch.snapshot,
            run_id = %batch.run_id,
            run_seq = receipt.run_seq,
            closed = receipt.closed,
            invalidated = receipt.invalidated,
            appended = receipt.appended,
            "Committed apply batch"
        );
        Ok(receipt)
    }
}

struct SqliteWriter<'a> {
    tx: &'a Transaction<'a>,
}

impl SqliteWriter<'_> {
    fn close(
        &self,
        snapshot: &str,
        closes: &[VersionClose],
        ts: DateTime<Utc>,
        reason: CloseReason,
    ) -> ExResult<usize> {
        let mut stmt = self
            .tx
            .prepare_cached(
                "UPDATE snapshot_versions SET valid_to = ?1, close_reason = ?2
                 WHERE snapshot_name = ?3 AND key = ?4 AND version_id = ?5
                   AND valid_to IS NULL AND valid_from < ?1",
            )
            .map_err(from_rusqlite)?;
        let mut affected = 0;
        for close in closes {
            affected += stmt
                .execute(params![
                    to_millis(ts),
                    reason.as_str(),
                    snapshot,
                    close.key.as_str(),
                    close.version_id
                ])
                .map_err(from_rusqlite)?;
        }
        Ok(affected)
    }
}

impl TableWriter for SqliteWriter<'_> {
    fn head_run(&mut self, snapshot: &str) -> ExResult<Option<RunRecord>> {
        query_head(self.tx, snapshot)
    }

    fn append_versions(&mut self, snapshot: &str, rows: &[SnapshotRow]) -> ExResult<usize> {
        let mut stmt = self
            .tx
            .prepare_cached(
                "INSERT INTO snapshot_versions (
                    snapshot_name, key, version_id, fingerprint, payload,
                    valid_from, valid_to, close_reason, run_id
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL, ?7)",
            )
            .map_err(from_rusqlite)?;
        let mut affected = 0;
        for row in rows {
            affected += stmt
                .execute(params![
                    snapshot,
                    row.key.as_str(),
                    row.version_id,
                    row.fingerprint,
                    encode_payload(row)?,
                    to_millis(row.valid_from),
                    row.run_id.as_str(),
                ])
                .map_err(|e| from_rusqlite(e).with_key(row.key.to_string()))?;
        }
        tracing::debug!(snapshot, rows = affected, "append_versions");
        Ok(affected)
    }

    fn close_versions(
        &mut self,
        snapshot: &str,
        closes: &[VersionClose],
        ts: DateTime<Utc>,
    ) -> ExResult<usize> {
        let affected = self.close(snapshot, closes, ts, CloseReason::Superseded)?;
        tracing::debug!(snapshot, rows = affected, "close_versions");
        Ok(affected)
    }

    fn hard_invalidate(
        &mut self,
        snapshot: &str,
        closes: &[VersionClose],
        ts: DateTime<Utc>,
    ) -> ExResult<usize> {
        let affected = self.close(snapshot, closes, ts, CloseReason::Invalidated)?;
        tracing::debug!(snapshot, rows = affected, "hard_invalidate");
        Ok(affected)
    }

    fn record_run(&mut self, record: &RunRecord) -> ExResult<()> {
        let c = &record.counts;
        self.tx
            .execute(
                "INSERT INTO snapshot_runs (
                    snapshot_name, run_seq, run_id, run_at, inserted, updated,
                    invalidated, unchanged, skipped_invalidated, row_errors, status
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.snapshot_name,
                    record.run_seq as i64,
                    record.run_id.as_str(),
                    to_millis(record.run_at),
                    c.inserted as i64,
                    c.updated as i64,
                    c.invalidated as i64,
                    c.unchanged as i64,
                    c.skipped_invalidated as i64,
                    c.row_errors as i64,
                    record.status,
                ],
            )
            .map_err(from_rusqlite)?;
        tracing::debug!(
            snapshot = %record.snapshot_name,
            run_seq = record.run_seq,
            "Recorded run"
        );
        Ok(())
    }
}
