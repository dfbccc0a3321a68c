//! SCDX CLI
//!
//! Command-line interface for running and inspecting snapshot targets

use clap::{Parser, Subcommand};
use scdx_core::logging_facility::{init, Profile};
use std::path::PathBuf;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "scdx")]
#[command(about = "SCDX - Type-2 snapshot engine", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every subcommand
#[derive(Debug, clap::Args)]
pub struct GlobalArgs {
    /// Target database holding snapshot tables and the run ledger
    #[arg(long, global = true, env = "SCDX_DB", default_value = "scdx.db")]
    pub db: PathBuf,

    /// Snapshot definitions file
    #[arg(
        long,
        global = true,
        env = "SCDX_CONFIG",
        default_value = "snapshots.yml"
    )]
    pub config: PathBuf,

    /// Log output format on stderr
    #[arg(
        long,
        global = true,
        default_value = "pretty",
        value_parser = ["pretty", "json"]
    )]
    pub log_format: String,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Snapshot operations
    Snapshot(commands::snapshot::SnapshotArgs),
}

fn main() {
    let cli = Cli::parse();
    init(Profile::from_format(&cli.global.log_format));

    let result = match cli.command {
        Commands::Snapshot(args) => commands::snapshot::execute(&cli.global, args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
