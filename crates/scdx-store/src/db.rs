//! SQLite connections for snapshot targets and source tables

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;

/// How long a writer waits for another writer's lock before giving up
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a target database read-write, creating it if missing, and configure it.
///
/// Migrations are not applied here; see `SqliteTableStore::open`.
pub fn open_target<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open(path).map_err(from_rusqlite)?;
    configure(&conn)?;
    Ok(conn)
}

/// Scratch target database
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(from_rusqlite)?;
    conn.pragma_update(None, "foreign_keys", true)
        .map_err(from_rusqlite)?;
    Ok(conn)
}

/// Open a source database without write access. A missing file is an error.
pub fn open_source<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(from_rusqlite)?;
    conn.busy_timeout(BUSY_TIMEOUT).map_err(from_rusqlite)?;
    Ok(conn)
}

/// Target connection settings: enforced foreign keys, WAL so readers do not
/// block the single writer, and a bounded wait on the write lock.
pub fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", true)
        .map_err(from_rusqlite)?;
    // journal_mode answers with the resulting mode
    let mode: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .map_err(from_rusqlite)?;
    tracing::debug!(journal_mode = mode.as_str(), "Configured target connection");
    conn.busy_timeout(BUSY_TIMEOUT).map_err(from_rusqlite)
}
