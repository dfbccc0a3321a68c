//! Snapshot run orchestration.
//!
//! ## Pipeline (in order):
//! 1. Validate the configuration (before any row is read)
//! 2. Read the full source extract
//! 3. Read the current-version index and ledger head as one consistent read
//! 4. Reconcile (strict mode fails here, nothing written)
//! 5. dry_run short-circuit (no writes)
//! 6. Commit closes, invalidations, appends and the ledger entry atomically,
//!    guarded by the ledger head read in step 3

#![allow(clippy::result_large_err)]

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use scdx_core::errors::{ExError, ExResult};
use scdx_core::store::{ApplyBatch, CommitReceipt, SnapshotTableStore};
use scdx_core::{
    verify_history, HistoryReport, Reconciler, RowError, RunCounts, RunStamp, SnapshotConfig,
    SourceExtractProvider,
};
use scdx_core_types::{RunContext, RunId};
use std::time::Instant;

/// Options for one snapshot run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Compute the plan but write nothing
    pub dry_run: bool,
    /// Run timestamp; defaults to now. Truncated to milliseconds.
    pub run_at: Option<DateTime<Utc>>,
    /// Correlation context; a fresh run id is generated when absent
    pub context: Option<RunContext>,
}

/// Outcome of a snapshot run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub snapshot: String,
    pub run_id: RunId,
    pub run_at: DateTime<Utc>,
    pub counts: RunCounts,
    pub row_errors: Vec<RowError>,
    /// Rows the plan writes (closes + invalidations + appends)
    pub planned_writes: usize,
    /// `None` for dry runs and runs with nothing to write
    pub receipt: Option<CommitReceipt>,
    pub dry_run: bool,
}

impl RunOutcome {
    pub fn committed(&self) -> bool {
        self.receipt.is_some()
    }

    /// Machine-readable run summary. Row errors carry codes and keys only.
    pub fn to_json(&self) -> serde_json::Value {
        let row_errors: Vec<serde_json::Value> = self
            .row_errors
            .iter()
            .map(|e| {
                serde_json::json!({
                    "ordinal": e.ordinal,
                    "key": e.key.as_ref().map(|k| k.as_str()),
                    "code": e.error.code(),
                    "message": e.error.to_string(),
                })
            })
            .collect();
        serde_json::json!({
            "snapshot": self.snapshot,
            "run_id": self.run_id.as_str(),
            "run_at": self.run_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            "dry_run": self.dry_run,
            "committed": self.committed(),
            "run_seq": self.receipt.as_ref().map(|r| r.run_seq),
            "planned_writes": self.planned_writes,
            "counts": self.counts,
            "row_errors": row_errors,
        })
    }
}

/// Run one snapshot target end to end.
///
/// ## Errors
///
/// - Configuration class: invalid config, strict-mode row errors, missing source
/// - Connectivity class: source or target unreachable (safe to retry)
/// - Integrity class: concurrent run won, or a write broke a history invariant;
///   nothing was written and a rerun is safe
pub fn run_snapshot<S: SnapshotTableStore + ?Sized>(
    snapshot: &str,
    config: &SnapshotConfig,
    extract: &dyn SourceExtractProvider,
    store: &mut S,
    options: RunOptions,
) -> ExResult<RunOutcome> {
    let start = Instant::now();
    let context = options.context.clone().unwrap_or_default();
    let run_id = context.run_id.clone();

    scdx_core::log_op_start!(
        "run_snapshot",
        snapshot = snapshot,
        run_id = run_id.as_str(),
        source = extract.describe().as_str(),
        dry_run = options.dry_run
    );

    match run_inner(snapshot, config, extract, store, &options, &run_id) {
        Ok(outcome) => {
            let duration_ms = start.elapsed().as_millis() as u64;
            scdx_core::log_op_end!(
                "run_snapshot",
                duration_ms = duration_ms,
                snapshot = snapshot,
                run_id = run_id.as_str(),
                inserted = outcome.counts.inserted,
                updated = outcome.counts.updated,
                invalidated = outcome.counts.invalidated,
                unchanged = outcome.counts.unchanged,
                row_errors = outcome.counts.row_errors,
                committed = outcome.committed()
            );
            Ok(outcome)
        }
        Err(e) => {
            let mut err = e.with_snapshot(snapshot).with_run_id(run_id.clone());
            if let Some(trace_id) = &context.trace_id {
                err = err.with_trace_id(trace_id.clone());
            }
            let duration_ms = start.elapsed().as_millis() as u64;
            scdx_core::log_op_error!(
                "run_snapshot",
                err.clone(),
                duration_ms = duration_ms,
                snapshot = snapshot,
                run_id = run_id.as_str()
            );
            Err(err)
        }
    }
}

fn run_inner<S: SnapshotTableStore + ?Sized>(
    snapshot: &str,
    config: &SnapshotConfig,
    extract: &dyn SourceExtractProvider,
    store: &mut S,
    options: &RunOptions,
    run_id: &RunId,
) -> ExResult<RunOutcome> {
    let reconciler = Reconciler::new(config.clone())?;

    let rows = extract.extract()?;
    let state = store.current_state(snapshot)?;
    let expected_run_seq = state.head_run_seq;

    let run_at = options.run_at.unwrap_or_else(Utc::now).trunc_subsecs(3);
    let stamp = RunStamp::new(run_id.clone(), run_at);
    let result = reconciler.reconcile(&rows, &state.index, &stamp)?;

    for row_error in &result.row_errors {
        tracing::warn!(
            snapshot,
            ordinal = ?row_error.ordinal,
            key = ?row_error.key.as_ref().map(|k| k.as_str()),
            err_code = row_error.error.code(),
            "Row skipped: {}",
            row_error.error
        );
    }

    let mut outcome = RunOutcome {
        snapshot: snapshot.to_string(),
        run_id: run_id.clone(),
        run_at,
        counts: result.counts,
        row_errors: result.row_errors,
        planned_writes: result.plan.write_count(),
        receipt: None,
        dry_run: options.dry_run,
    };

    if options.dry_run || result.plan.is_empty() {
        return Ok(outcome);
    }

    let receipt = store.commit(&ApplyBatch {
        snapshot: snapshot.to_string(),
        run_id: run_id.clone(),
        run_at,
        expected_run_seq,
        plan: result.plan,
        counts: result.counts,
    })?;
    outcome.receipt = Some(receipt);
    Ok(outcome)
}

/// Check the stored history of a target.
pub fn verify_snapshot<S: SnapshotTableStore + ?Sized>(
    snapshot: &str,
    store: &S,
) -> ExResult<HistoryReport> {
    let start = Instant::now();
    scdx_core::log_op_start!("verify_snapshot", snapshot = snapshot);

    let report = store
        .history(snapshot, None)
        .map(|rows| verify_history(&rows))
        .map_err(|e: ExError| e.with_snapshot(snapshot));

    let duration_ms = start.elapsed().as_millis() as u64;
    match report {
        Ok(report) => {
            scdx_core::log_op_end!(
                "verify_snapshot",
                duration_ms = duration_ms,
                snapshot = snapshot,
                violations = report.violations.len() as u64
            );
            Ok(report)
        }
        Err(err) => {
            scdx_core::log_op_error!("verify_snapshot", err.clone(), duration_ms = duration_ms);
            Err(err)
        }
    }
}
