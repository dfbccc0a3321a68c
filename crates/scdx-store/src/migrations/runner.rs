//! Migration runner
//!
//! Applies embedded migrations in order, one transaction each, and refuses to
//! run against a database whose recorded checksums disagree with the binary.

#![allow(clippy::result_large_err)]

use crate::errors::{checksum_mismatch, from_rusqlite, migration_error, Result};
use crate::migrations::checksums::compute_checksum;
use crate::migrations::embedded::get_migrations;
use rusqlite::{Connection, OptionalExtension};

/// State of one embedded migration against the database
enum Recorded {
    Missing,
    Matches,
    Differs(String),
}

/// Apply all pending migrations to the database
///
/// ## Errors
///
/// - `ExErrorKind::Integrity` when an applied migration's checksum changed
/// - `ExErrorKind::Persistence` when a migration fails to apply
pub fn apply_migrations(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY,
            migration_id TEXT NOT NULL UNIQUE,
            applied_at INTEGER NOT NULL,
            checksum TEXT
        );",
    )
    .map_err(from_rusqlite)?;

    // Every recorded checksum is checked before anything new is applied
    let mut pending = Vec::new();
    for migration in get_migrations() {
        let checksum = compute_checksum(migration.sql);
        match recorded_checksum(conn, migration.id, &checksum)? {
            Recorded::Matches => {}
            Recorded::Differs(existing) => {
                return Err(checksum_mismatch(migration.id, &existing, &checksum))
            }
            Recorded::Missing => pending.push((migration, checksum)),
        }
    }

    if pending.is_empty() {
        tracing::debug!("Target schema up to date");
        return Ok(());
    }
    for (migration, checksum) in pending {
        let tx = conn.transaction().map_err(from_rusqlite)?;
        tx.execute_batch(migration.sql)
            .map_err(|e| migration_error(migration.id, &e.to_string()))?;
        tx.execute(
            "INSERT INTO schema_version (migration_id, applied_at, checksum) VALUES (?1, ?2, ?3)",
            rusqlite::params![migration.id, chrono::Utc::now().timestamp_millis(), checksum],
        )
        .map_err(from_rusqlite)?;
        tx.commit().map_err(from_rusqlite)?;
        tracing::info!(migration_id = migration.id, "Applied migration");
    }
    Ok(())
}

/// Migration ids recorded in the database, in application order
pub fn applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT migration_id FROM schema_version ORDER BY id")
        .map_err(from_rusqlite)?;
    let ids = stmt
        .query_map([], |row| row.get(0))
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<String>, _>>()
        .map_err(from_rusqlite)?;
    Ok(ids)
}

fn recorded_checksum(conn: &Connection, migration_id: &str, checksum: &str) -> Result<Recorded> {
    let row: Option<Option<String>> = conn
        .query_row(
            "SELECT checksum FROM schema_version WHERE migration_id = ?1",
            [migration_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(from_rusqlite)?;
    Ok(match row {
        None => Recorded::Missing,
        // Rows written without a checksum are trusted
        Some(None) => Recorded::Matches,
        Some(Some(existing)) if existing == checksum => Recorded::Matches,
        Some(Some(existing)) => Recorded::Differs(existing),
    })
}
