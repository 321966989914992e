//! tsvwatch command-line launcher
//!
//! - `watch`: poll a directory and ingest every new `*.tsv` file
//! - `ingest`: ingest a single file
//! - `get`: fetch the N-th event of a device
//! - `status`: ledger and device counters

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tsvwatch_logging::{init_logging, LogConfig};

mod cli;

#[derive(Parser, Debug)]
#[command(name = "tsvwatch", version, about = "Directory-polling TSV event ingester")]
struct Cli {
    /// Enable verbose logging on stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Only warnings and errors on stderr
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch a directory and ingest new TSV files until interrupted
    Watch(cli::watch::WatchArgs),

    /// Ingest one TSV file
    Ingest(cli::ingest::IngestArgs),

    /// Look up the N-th event of a device
    Get(cli::get::GetArgs),

    /// Show ledger and device counters
    Status(cli::status::StatusArgs),
}

fn run_command(cli: Cli) -> Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    runtime.block_on(async {
        match cli.command {
            Commands::Watch(args) => cli::watch::run(args).await.map(|()| ExitCode::SUCCESS),
            Commands::Ingest(args) => cli::ingest::run(args).await.map(|()| ExitCode::SUCCESS),
            Commands::Get(args) => cli::get::run(args).await,
            Commands::Status(args) => cli::status::run(args).await.map(|()| ExitCode::SUCCESS),
        }
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = LogConfig::new("tsvwatch");
    log_config.verbose = cli.verbose;
    log_config.quiet = cli.quiet;
    if let Err(err) = init_logging(log_config) {
        eprintln!("Warning: logging disabled: {:#}", err);
    }

    match run_command(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:?}", err);
            ExitCode::from(1)
        }
    }
}
