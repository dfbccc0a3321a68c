//! Reconciler: compares a source extract with the current versions of a
//! snapshot target and derives the writes of one run.
//!
//! The Reconciler never touches a store. It receives the current-version
//! index (read once by the caller) and returns an [`ApplyPlan`] the caller
//! commits atomically.

pub mod plan;
pub mod reconciler;

pub use plan::{ApplyPlan, RunCounts, VersionClose};
pub use reconciler::{ReconcileResult, Reconciler, RowError, RunStamp};
