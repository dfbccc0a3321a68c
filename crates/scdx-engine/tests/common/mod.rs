use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use scdx_engine::commands::engine_command::{
    apply_engine_command, EngineCommand, EngineCommandResult,
};
use scdx_engine::commands::snapshot::{RunOptions, RunOutcome};
use scdx_store::definitions::parse_definitions_str;
use scdx_store::{SnapshotDefinition, SqliteTableStore};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const TARGET: &str = "customers_snapshot";

/// A bronze source database and a snapshot target database in one temp dir
pub struct Lake {
    pub dir: TempDir,
    pub store: SqliteTableStore,
}

#[allow(dead_code)]
impl Lake {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let conn = Connection::open(dir.path().join("bronze.db")).unwrap();
        conn.execute_batch("CREATE TABLE customers (id INTEGER, name TEXT, city TEXT);")
            .unwrap();
        let store = SqliteTableStore::open(dir.path().join("silver.db")).unwrap();
        Self { dir, store }
    }

    pub fn target_path(&self) -> PathBuf {
        self.dir.path().join("silver.db")
    }

    /// Replace the source table contents
    pub fn set_source(&self, rows: &[(Option<i64>, &str, &str)]) {
        let conn = Connection::open(self.dir.path().join("bronze.db")).unwrap();
        conn.execute("DELETE FROM customers", []).unwrap();
        for (id, name, city) in rows {
            conn.execute(
                "INSERT INTO customers (id, name, city) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, name, city],
            )
            .unwrap();
        }
    }

    /// Definition of the customers target with extra YAML settings
    pub fn definition(&self, extra: &str) -> SnapshotDefinition {
        let yaml = format!(
            r#"
schema_version: 1
snapshots:
  - name: {TARGET}
    source:
      sqlite: {{ path: bronze.db, table: customers }}
    unique_key: [id]
{extra}
"#
        );
        let defs = parse_definitions_str(&yaml, self.dir.path()).unwrap();
        defs.get(TARGET).unwrap().clone()
    }

    pub fn run(&mut self, definition: &SnapshotDefinition, at: DateTime<Utc>) -> RunOutcome {
        self.try_run(definition, at, false).unwrap()
    }

    pub fn try_run(
        &mut self,
        definition: &SnapshotDefinition,
        at: DateTime<Utc>,
        dry_run: bool,
    ) -> scdx_core::ExResult<RunOutcome> {
        let result = apply_engine_command(
            EngineCommand::SnapshotRun {
                definition: definition.clone(),
                options: RunOptions {
                    dry_run,
                    run_at: Some(at),
                    context: None,
                },
            },
            &mut self.store,
        )?;
        match result {
            EngineCommandResult::Run(outcome) => Ok(outcome),
            other => panic!("unexpected result {:?}", other),
        }
    }

    pub fn dir_path(&self) -> &Path {
        self.dir.path()
    }
}

#[allow(dead_code)]
pub fn day(n: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, n, 0, 0, 0).unwrap()
}
