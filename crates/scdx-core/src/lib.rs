//! SCDX Core - Slowly-changing-dimension (Type 2) kernel
//!
//! This crate holds the storage-independent parts of the snapshot engine:
//! - Source values, rows, unique keys and versioned snapshot rows
//! - The Row Hasher (check-strategy fingerprints over tracked columns)
//! - The Reconciler, which turns a source extract plus the current-version
//!   index into an atomic apply plan
//! - The `SnapshotTableStore` / `SourceExtractProvider` seams and an
//!   in-memory table store
//! - History verification (gaps, overlaps, duplicate current versions)
//! - Error and logging facilities shared with the store and engine crates

pub mod errors;
pub mod extract;
pub mod hasher;
pub mod history;
pub mod logging_facility;
pub mod memory;
pub mod model;
pub mod reconcile;
pub mod store;

// Macros expand to paths under this re-export.
pub use scdx_core_types;

// Re-export commonly used types
pub use errors::{ErrorClass, ExError, ExErrorKind, ExResult, Result, ScdError};
pub use extract::{SourceExtractProvider, VecExtract};
pub use memory::MemoryTableStore;
pub use model::{
    CloseReason, CurrentSnapshotIndex, DuplicateKeyPolicy, KeyValue, SnapshotConfig,
    SnapshotRow, SourceRow, TrackedColumns, Value,
};
pub use history::{verify_history, HistoryReport, HistoryViolation, ViolationKind};
pub use reconcile::{
    ApplyPlan, ReconcileResult, Reconciler, RowError, RunCounts, RunStamp, VersionClose,
};
pub use store::{
    ApplyBatch, CommitReceipt, RunRecord, SnapshotTableStore, TableWriter, TargetState,
};
