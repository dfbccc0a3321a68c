//! Snapshot Table Store seam.
//!
//! A store holds, per snapshot target, every version ever written plus a run
//! ledger. Reads are plain queries. Writes happen only through `commit`, which
//! hands a `TableWriter` to [`apply_batch`] inside one atomic unit.
//!
//! ## Commit protocol
//!
//! 1. Read the ledger head and compare its `run_seq` with
//!    `ApplyBatch::expected_run_seq` (compare-and-swap)
//! 2. Reject a `run_at` earlier than the head's `run_at`
//! 3. Close superseded versions
//! 4. Close invalidated versions
//! 5. Append new versions
//! 6. Record the run in the ledger
//!
//! Any failure abandons the whole unit.

#![allow(clippy::result_large_err)]

use crate::errors::{ExError, ExErrorKind, ExResult, ScdError};
use crate::model::{CurrentSnapshotIndex, KeyValue, SnapshotRow};
use crate::reconcile::{ApplyPlan, RunCounts, VersionClose};
use chrono::{DateTime, Utc};
use scdx_core_types::RunId;
use serde::Serialize;

/// Ledger status of a committed run
pub const RUN_STATUS_COMMITTED: &str = "committed";

/// Everything one run wants to write
#[derive(Debug, Clone)]
pub struct ApplyBatch {
    pub snapshot: String,
    pub run_id: RunId,
    pub run_at: DateTime<Utc>,
    /// `run_seq` of the ledger head the plan was computed against (0 = no runs yet)
    pub expected_run_seq: u64,
    pub plan: ApplyPlan,
    pub counts: RunCounts,
}

/// Result of a successful commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitReceipt {
    pub run_id: RunId,
    pub run_seq: u64,
    pub closed: usize,
    pub invalidated: usize,
    pub appended: usize,
}

/// One entry of the run ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub snapshot_name: String,
    pub run_seq: u64,
    pub run_at: DateTime<Utc>,
    pub counts: RunCounts,
    pub status: String,
}

/// Current versions of a target together with the ledger head they belong to
#[derive(Debug, Clone)]
pub struct TargetState {
    pub index: CurrentSnapshotIndex,
    /// `run_seq` of the ledger head (0 = no runs yet)
    pub head_run_seq: u64,
}

/// Read side of a snapshot table store.
pub trait SnapshotTableStore {
    /// Current version of one key, if any
    fn current_version(&self, snapshot: &str, key: &KeyValue) -> ExResult<Option<SnapshotRow>>;

    /// Every current version of a target in one bulk read, plus retired keys
    fn current_versions(&self, snapshot: &str) -> ExResult<CurrentSnapshotIndex>;

    /// Full history, ordered by key then `valid_from`; optionally one key only
    fn history(&self, snapshot: &str, key: Option<&KeyValue>) -> ExResult<Vec<SnapshotRow>>;

    /// Versions that were live at `ts`, ordered by key
    fn as_of(&self, snapshot: &str, ts: DateTime<Utc>) -> ExResult<Vec<SnapshotRow>>;

    /// Ledger head of a target
    fn last_run(&self, snapshot: &str) -> ExResult<Option<RunRecord>>;

    /// Whole ledger of a target, oldest first
    fn list_runs(&self, snapshot: &str) -> ExResult<Vec<RunRecord>>;

    /// Current versions and ledger head as one consistent read.
    ///
    /// The default reads the head on both sides of the bulk read and fails
    /// when a commit landed in between. Backends with read transactions
    /// should override it.
    ///
    /// ## Errors
    ///
    /// - `ExErrorKind::Concurrency` when the ledger moved during the read
    fn current_state(&self, snapshot: &str) -> ExResult<TargetState> {
        let before = self.last_run(snapshot)?.map_or(0, |r| r.run_seq);
        let index = self.current_versions(snapshot)?;
        let after = self.last_run(snapshot)?.map_or(0, |r| r.run_seq);
        if before != after {
            return Err(ExError::new(ExErrorKind::Concurrency)
                .with_op("current_state")
                .with_snapshot(snapshot)
                .with_message(format!(
                    "ledger moved from run_seq {} to {} while reading current versions",
                    before, after
                )));
        }
        Ok(TargetState {
            index,
            head_run_seq: after,
        })
    }

    /// Apply a batch atomically.
    ///
    /// ## Errors
    ///
    /// - `ExErrorKind::Concurrency` when the ledger moved past `expected_run_seq`
    /// - `ExErrorKind::Integrity` when a write would break a history invariant
    /// - `ExErrorKind::Connectivity` / `Persistence` for backend failures
    ///
    /// Nothing is written when an error is returned.
    fn commit(&mut self, batch: &ApplyBatch) -> ExResult<CommitReceipt>;
}

/// Write primitives, available only inside a commit.
pub trait TableWriter {
    /// Ledger head of the target being written
    fn head_run(&mut self, snapshot: &str) -> ExResult<Option<RunRecord>>;

    /// Append new current versions. A key that already has a current version
    /// is an integrity failure.
    fn append_versions(&mut self, snapshot: &str, rows: &[SnapshotRow]) -> ExResult<usize>;

    /// Close the named current versions at `ts` as superseded
    fn close_versions(
        &mut self,
        snapshot: &str,
        closes: &[VersionClose],
        ts: DateTime<Utc>,
    ) -> ExResult<usize>;

    /// Close the named current versions at `ts` as invalidated by a hard delete
    fn hard_invalidate(
        &mut self,
        snapshot: &str,
        closes: &[VersionClose],
        ts: DateTime<Utc>,
    ) -> ExResult<usize>;

    /// Append the run to the ledger
    fn record_run(&mut self, record: &RunRecord) -> ExResult<()>;
}

/// Run the commit protocol against a writer.
///
/// The caller owns atomicity: it must discard everything the writer did when
/// this returns an error.
///
/// ## Errors
///
/// See [`SnapshotTableStore::commit`].
pub fn apply_batch<W: TableWriter + ?Sized>(
    writer: &mut W,
    batch: &ApplyBatch,
) -> ExResult<CommitReceipt> {
    let op = "commit";
    let head = writer.head_run(&batch.snapshot)?;
    let head_seq = head.as_ref().map_or(0, |r| r.run_seq);

    if head_seq != batch.expected_run_seq {
        return Err(ExError::from(ScdError::RunSequenceMismatch {
            snapshot: batch.snapshot.clone(),
            expected: batch.expected_run_seq,
            actual: head_seq,
        })
        .with_op(op)
        .with_run_id(batch.run_id.clone()));
    }

    if let Some(head) = &head {
        if batch.run_at < head.run_at {
            return Err(ExError::from(ScdError::RunTimestampRegression {
                snapshot: batch.snapshot.clone(),
                run_at: batch.run_at.to_rfc3339(),
                last_run_at: head.run_at.to_rfc3339(),
            })
            .with_op(op)
            .with_run_id(batch.run_id.clone()));
        }
    }

    let closed = writer.close_versions(&batch.snapshot, &batch.plan.closes, batch.run_at)?;
    expect_affected(op, &batch.snapshot, "close_versions", batch.plan.closes.len(), closed)?;

    let invalidated =
        writer.hard_invalidate(&batch.snapshot, &batch.plan.invalidations, batch.run_at)?;
    expect_affected(
        op,
        &batch.snapshot,
        "hard_invalidate",
        batch.plan.invalidations.len(),
        invalidated,
    )?;

    let appended = writer.append_versions(&batch.snapshot, &batch.plan.appends)?;
    expect_affected(op, &batch.snapshot, "append_versions", batch.plan.appends.len(), appended)?;

    let run_seq = head_seq + 1;
    writer.record_run(&RunRecord {
        run_id: batch.run_id.clone(),
        snapshot_name: batch.snapshot.clone(),
        run_seq,
        run_at: batch.run_at,
        counts: batch.counts,
        status: RUN_STATUS_COMMITTED.to_string(),
    })?;

    Ok(CommitReceipt {
        run_id: batch.run_id.clone(),
        run_seq,
        closed,
        invalidated,
        appended,
    })
}

fn expect_affected(
    op: &str,
    snapshot: &str,
    primitive: &str,
    expected: usize,
    actual: usize,
) -> ExResult<()> {
    if expected == actual {
        return Ok(());
    }
    Err(ExError::new(ExErrorKind::Integrity)
        .with_op(op)
        .with_snapshot(snapshot)
        .with_message(format!(
            "{} affected {} rows, expected {}",
            primitive, actual, expected
        )))
}

