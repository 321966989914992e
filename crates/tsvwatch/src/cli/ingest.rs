//! `tsvwatch ingest`: parse, record and persist one file without watching.

use super::StorageArgs;
use anyhow::{bail, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tsvwatch::{FileOutcome, LoggingObserver, Pipeline, PipelineConfig};

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// TSV file to ingest
    pub file: PathBuf,

    #[command(flatten)]
    pub storage: StorageArgs,
}

pub async fn run(args: IngestArgs) -> Result<()> {
    let Some(name) = args.file.file_name().and_then(|n| n.to_str()) else {
        bail!("Not a file name: {}", args.file.display());
    };
    let directory = args
        .file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let config = args.storage.load_config()?;
    let store = args.storage.open(&config).await?;
    let pipeline = Pipeline::new(
        Arc::clone(&store),
        PipelineConfig {
            directory,
            refresh: Duration::from_secs(config.refresh_secs.max(1)),
            queue_capacity: 1,
        },
    )
    .with_observer(Arc::new(LoggingObserver));

    let report = pipeline.ingest_file(name).await;
    store.close().await;

    if let Some(ledger_error) = &report.ledger_error {
        eprintln!("Warning: {}", ledger_error);
    }
    match report.outcome {
        FileOutcome::Ingested { events } => {
            println!("{}: {} event(s) persisted", report.name, events);
            Ok(())
        }
        FileOutcome::ParseFailed(error) => bail!("Parse failed: {}", error),
        FileOutcome::PersistFailed(error) => bail!("Persist failed: {}", error),
    }
}
