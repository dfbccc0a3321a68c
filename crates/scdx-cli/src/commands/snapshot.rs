//! Snapshot run and inspection commands
//!
//! Results are written to stdout as one JSON document per line.

use crate::GlobalArgs;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use scdx_core::{KeyValue, SnapshotRow};
use scdx_engine::commands::engine_command::{
    apply_engine_command, EngineCommand, EngineCommandResult,
};
use scdx_engine::commands::snapshot::RunOptions;
use scdx_store::{load_definitions, SqliteTableStore};
use std::path::Path;

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    #[command(subcommand)]
    pub command: SnapshotCommand,
}

#[derive(Debug, Subcommand)]
pub enum SnapshotCommand {
    /// Reconcile targets against their sources and commit
    Run(RunArgs),
    /// Current version of every key
    Current(NameArgs),
    /// Version history, optionally of one key
    History(HistoryArgs),
    /// Rows valid at an instant
    AsOf(AsOfArgs),
    /// Check history invariants; exits non-zero on violations
    Verify(NameArgs),
    /// Run ledger of a target
    List(NameArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Target to run
    #[arg(long, conflicts_with = "all")]
    pub name: Option<String>,

    /// Run every target in the definitions file, in file order
    #[arg(long, conflicts_with = "name")]
    pub all: bool,

    /// Plan and report without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Run timestamp (RFC 3339); defaults to now
    #[arg(long, value_parser = parse_instant)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Args)]
pub struct NameArgs {
    #[arg(long)]
    pub name: String,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    #[arg(long)]
    pub name: String,

    /// Unique key as JSON, e.g. `1` or `["eu", 42]`
    #[arg(long, value_parser = parse_key)]
    pub key: Option<KeyValue>,
}

#[derive(Debug, Args)]
pub struct AsOfArgs {
    #[arg(long)]
    pub name: String,

    /// Instant (RFC 3339)
    #[arg(long, value_parser = parse_instant)]
    pub at: DateTime<Utc>,
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp '{}': {}", s, e))
}

fn parse_key(s: &str) -> Result<KeyValue, String> {
    KeyValue::parse(s).map_err(|e| e.to_string())
}

pub fn execute(global: &GlobalArgs, args: SnapshotArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = open_store(&global.db)?;

    match args.command {
        SnapshotCommand::Run(run_args) => execute_run(global, &mut store, run_args),
        SnapshotCommand::Current(a) => {
            let cmd = EngineCommand::SnapshotCurrent { name: a.name };
            print_rows(apply_engine_command(cmd, &mut store)?)
        }
        SnapshotCommand::History(a) => {
            let cmd = EngineCommand::SnapshotHistory {
                name: a.name,
                key: a.key,
            };
            print_rows(apply_engine_command(cmd, &mut store)?)
        }
        SnapshotCommand::AsOf(a) => {
            let cmd = EngineCommand::SnapshotAsOf {
                name: a.name,
                at: a.at,
            };
            print_rows(apply_engine_command(cmd, &mut store)?)
        }
        SnapshotCommand::Verify(a) => {
            let cmd = EngineCommand::SnapshotVerify {
                name: a.name.clone(),
            };
            match apply_engine_command(cmd, &mut store)? {
                EngineCommandResult::Verify(report) => {
                    println!("{}", serde_json::to_string(&report)?);
                    if report.is_clean() {
                        Ok(())
                    } else {
                        Err(format!(
                            "{} history violation(s) in {}",
                            report.violations.len(),
                            a.name
                        )
                        .into())
                    }
                }
                other => Err(unexpected(&other)),
            }
        }
        SnapshotCommand::List(a) => {
            let cmd = EngineCommand::SnapshotList { name: a.name };
            match apply_engine_command(cmd, &mut store)? {
                EngineCommandResult::Runs(runs) => {
                    for run in runs {
                        println!("{}", serde_json::to_string(&run)?);
                    }
                    Ok(())
                }
                other => Err(unexpected(&other)),
            }
        }
    }
}

fn execute_run(
    global: &GlobalArgs,
    store: &mut SqliteTableStore,
    args: RunArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    if args.name.is_none() && !args.all {
        return Err("Must specify either --name or --all".into());
    }

    let definitions = load_definitions(&global.config)?;
    let targets = match &args.name {
        Some(name) => vec![definitions.get(name)?.clone()],
        None => definitions.snapshots().to_vec(),
    };

    // One failing target does not stop the others
    let mut failed = 0usize;
    for definition in targets.iter() {
        let cmd = EngineCommand::SnapshotRun {
            definition: definition.clone(),
            options: RunOptions {
                dry_run: args.dry_run,
                run_at: args.at,
                context: None,
            },
        };
        match apply_engine_command(cmd, store) {
            Ok(EngineCommandResult::Run(outcome)) => println!("{}", outcome.to_json()),
            Ok(other) => return Err(unexpected(&other)),
            Err(e) => {
                eprintln!("Error: {}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} of {} snapshot run(s) failed", failed, targets.len()).into());
    }
    Ok(())
}

fn open_store(db: &Path) -> Result<SqliteTableStore, Box<dyn std::error::Error>> {
    if let Some(parent) = db.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(SqliteTableStore::open(db)?)
}

fn print_rows(result: EngineCommandResult) -> Result<(), Box<dyn std::error::Error>> {
    match result {
        EngineCommandResult::Rows(rows) => {
            rows.iter().map(SnapshotRow::to_json).for_each(|row| println!("{}", row));
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

fn unexpected(result: &EngineCommandResult) -> Box<dyn std::error::Error> {
    format!("unexpected engine result: {:?}", result).into()
}
