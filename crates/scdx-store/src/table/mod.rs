//! SQLite Snapshot Table Store.
//!
//! ## Responsibilities
//!
//! - Bulk and point reads of current versions
//! - History and point-in-time reads
//! - Atomic commit of an apply batch in one `BEGIN IMMEDIATE` transaction,
//!   guarded by the run ledger's `run_seq`
//!
//! ## Non-Responsibilities
//!
//! - Deciding what to write (handled by `scdx-core`'s Reconciler)
//! - Orchestration (handled by `scdx-engine`)

mod codec;
mod sqlite_store;

pub use sqlite_store::SqliteTableStore;
