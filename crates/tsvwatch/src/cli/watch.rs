//! `tsvwatch watch`: run the ingestion pipeline until Ctrl-C.

use super::StorageArgs;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tsvwatch::{LoggingObserver, Pipeline, PipelineConfig, WatchConfig};

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub storage: StorageArgs,

    /// Directory to watch for *.tsv files
    #[arg(short, long, env = "TSVWATCH_DIR")]
    pub dir: Option<PathBuf>,

    /// Seconds between directory scans
    #[arg(long)]
    pub refresh_secs: Option<u64>,

    /// Capacity of the filename queue
    #[arg(long)]
    pub queue_capacity: Option<usize>,
}

impl WatchArgs {
    fn resolve(&self) -> Result<WatchConfig> {
        let mut config = self.storage.load_config()?;
        if let Some(dir) = &self.dir {
            config.directory = dir.display().to_string();
        }
        if let Some(secs) = self.refresh_secs {
            config.refresh_secs = secs;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        config.validate()?;
        Ok(config)
    }
}

pub async fn run(args: WatchArgs) -> Result<()> {
    let config = args.resolve()?;
    let directory = config.directory();
    if !directory.is_dir() {
        anyhow::bail!("Watch directory does not exist: {}", directory.display());
    }

    let store = args.storage.open(&config).await?;
    let pipeline = Pipeline::new(Arc::clone(&store), PipelineConfig::from(&config))
        .with_observer(Arc::new(LoggingObserver));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("interrupt received, shutting down"),
                Err(e) => warn!(error = %e, "cannot listen for Ctrl-C, shutting down"),
            }
            cancel.cancel();
        });
    }

    info!(
        dir = %directory.display(),
        backend = %store.backend(),
        refresh_secs = config.refresh_secs,
        "watching"
    );
    let result = pipeline.run(cancel).await;
    store.close().await;
    let summary = result.context("Pipeline stopped with an error")?;

    println!(
        "Ingested {} file(s), {} event(s). {} parse failure(s), {} persist failure(s), {} ledger failure(s).",
        summary.files_ingested,
        summary.events_persisted,
        summary.files_failed,
        summary.persist_failures,
        summary.ledger_failures
    );
    Ok(())
}
