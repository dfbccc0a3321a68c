//! Error handling for scdx-store
//!
//! Wraps scdx-core ExError with store-specific helpers

use rusqlite::ErrorCode;
use scdx_core::errors::{ExError, ExErrorKind};

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration")
        .with_message(format!("Migration {} failed: {}", migration_id, reason))
}

/// Create a checksum mismatch error
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> ExError {
    ExError::new(ExErrorKind::Integrity)
        .with_op("migration_checksum")
        .with_message(format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ))
}

/// Create a snapshot definition validation error
pub fn definition_error(reason: &str) -> ExError {
    ExError::new(ExErrorKind::InvalidConfig)
        .with_op("definitions_parse")
        .with_message(reason.to_string())
}

/// Create a database error from rusqlite::Error
///
/// Lock and open failures are connectivity problems the caller may retry.
/// Constraint violations mean a write would have broken a history invariant.
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    let kind = match &err {
        rusqlite::Error::SqliteFailure(e, _) => match e.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen => {
                ExErrorKind::Connectivity
            }
            ErrorCode::ConstraintViolation => ExErrorKind::Integrity,
            _ => ExErrorKind::Persistence,
        },
        _ => ExErrorKind::Persistence,
    };
    ExError::new(kind)
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// Create a serialization error for a stored column
pub fn corrupt_column(column: &str, reason: impl std::fmt::Display) -> ExError {
    ExError::new(ExErrorKind::Serialization)
        .with_op("sqlite_decode")
        .with_column(column)
        .with_message(reason.to_string())
}

/// Create an IO error
pub fn io_error(operation: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}
