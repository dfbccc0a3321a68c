//! SQL migrations compiled into the binary, in application order

/// One schema step of the target database
pub struct Migration {
    pub id: &'static str,
    pub sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: "001_snapshot_versions",
        sql: include_str!("../../migrations/001_snapshot_versions.sql"),
    },
    Migration {
        id: "002_run_ledger",
        sql: include_str!("../../migrations/002_run_ledger.sql"),
    },
];

pub fn get_migrations() -> &'static [Migration] {
    MIGRATIONS
}
