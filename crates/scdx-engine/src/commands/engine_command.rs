//! Engine-level commands.

#![allow(clippy::result_large_err)]

use crate::commands::snapshot::{run_snapshot, verify_snapshot, RunOptions, RunOutcome};
use chrono::{DateTime, Utc};
use scdx_core::errors::ExResult;
use scdx_core::store::{RunRecord, SnapshotTableStore};
use scdx_core::{HistoryReport, KeyValue, SnapshotRow};
use scdx_store::SnapshotDefinition;

/// Engine-level commands that require I/O (source, target store).
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Reconcile a target against its source and commit the result
    SnapshotRun {
        definition: SnapshotDefinition,
        options: RunOptions,
    },
    /// Current version of every key
    SnapshotCurrent { name: String },
    /// Full history, optionally of one key
    SnapshotHistory { name: String, key: Option<KeyValue> },
    /// State of the target at an instant
    SnapshotAsOf { name: String, at: DateTime<Utc> },
    /// Check history invariants
    SnapshotVerify { name: String },
    /// Run ledger
    SnapshotList { name: String },
}

/// Result of applying an engine command.
#[derive(Debug, Clone)]
pub enum EngineCommandResult {
    Run(RunOutcome),
    Rows(Vec<SnapshotRow>),
    Verify(HistoryReport),
    Runs(Vec<RunRecord>),
}

/// Apply an engine command against a store.
pub fn apply_engine_command<S: SnapshotTableStore + ?Sized>(
    cmd: EngineCommand,
    store: &mut S,
) -> ExResult<EngineCommandResult> {
    match cmd {
        EngineCommand::SnapshotRun {
            definition,
            options,
        } => {
            let provider = definition.provider()?;
            let outcome = run_snapshot(
                &definition.name,
                &definition.config(),
                provider.as_ref(),
                store,
                options,
            )?;
            Ok(EngineCommandResult::Run(outcome))
        }
        EngineCommand::SnapshotCurrent { name } => {
            let mut rows: Vec<SnapshotRow> =
                store.current_versions(&name)?.rows().cloned().collect();
            rows.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(EngineCommandResult::Rows(rows))
        }
        EngineCommand::SnapshotHistory { name, key } => {
            Ok(EngineCommandResult::Rows(store.history(&name, key.as_ref())?))
        }
        EngineCommand::SnapshotAsOf { name, at } => {
            Ok(EngineCommandResult::Rows(store.as_of(&name, at)?))
        }
        EngineCommand::SnapshotVerify { name } => {
            Ok(EngineCommandResult::Verify(verify_snapshot(&name, &*store)?))
        }
        EngineCommand::SnapshotList { name } => {
            Ok(EngineCommandResult::Runs(store.list_runs(&name)?))
        }
    }
}
