//! Migration checksums
//!
//! A recorded checksum that no longer matches the embedded SQL means the
//! migration was edited after it ran somewhere.

use sha2::{Digest, Sha256};

/// Hex SHA-256 of migration SQL with line endings normalized to `\n`
pub fn compute_checksum(sql: &str) -> String {
    let normalized = sql.replace("\r\n", "\n");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}
