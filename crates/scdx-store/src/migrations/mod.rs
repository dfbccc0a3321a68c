//! Target schema migrations
//!
//! Both tables of a target database (`snapshot_versions`, `snapshot_runs`) are
//! created here. Applied migrations are recorded with a checksum in
//! `schema_version`; reopening a database migrated by a different build with
//! edited SQL fails instead of silently diverging.

mod checksums;
mod embedded;
mod runner;

pub use runner::{applied_migrations, apply_migrations};
