//! SCDX Store - SQLite persistence for snapshot targets
//!
//! Provides:
//! - The SQLite Snapshot Table Store (versions table, run ledger, atomic commits)
//! - Migrations framework with checksums
//! - Source extract providers (SQLite source table, JSON file)
//! - YAML snapshot definitions

pub mod db;
pub mod definitions;
pub mod errors;
pub mod extract;
pub mod migrations;
pub mod table;

// Re-export key types
pub use definitions::{load_definitions, Definitions, SnapshotDefinition};
pub use errors::Result;
pub use extract::{JsonFileExtract, SqliteSourceExtract};
pub use table::SqliteTableStore;
