//! `tsvwatch status`: ledger and per-device counters.

use super::output::print_table;
use super::StorageArgs;
use anyhow::{Context, Result};
use clap::Args;
use std::collections::BTreeSet;
use tsvwatch_db::EventStore;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show the event count of this device (repeatable)
    #[arg(short, long)]
    pub device: Vec<String>,

    /// Show the ledger entry of this file (repeatable)
    #[arg(short, long)]
    pub file: Vec<String>,

    #[command(flatten)]
    pub storage: StorageArgs,
}

pub async fn run(args: StatusArgs) -> Result<()> {
    let config = args.storage.load_config()?;
    let store = args.storage.open(&config).await?;
    let result = report(store.as_ref(), &args).await;
    store.close().await;
    let rows = result?;

    print_table(&["item", "value"], rows);
    Ok(())
}

async fn report(store: &dyn EventStore, args: &StatusArgs) -> Result<Vec<Vec<String>>> {
    let mut files = BTreeSet::new();
    store
        .load_filenames(&mut files)
        .await
        .context("Failed to read the ledger")?;

    let mut rows = vec![
        vec!["backend".to_string(), store.backend().to_string()],
        vec!["files in ledger".to_string(), files.len().to_string()],
    ];

    for name in &args.file {
        let state = match store.filename_error(name).await? {
            None => "not seen".to_string(),
            Some(error) if error.is_empty() => "ingested".to_string(),
            Some(error) => format!("failed: {}", error),
        };
        rows.push(vec![format!("file {}", name), state]);
    }

    for device in &args.device {
        let count = store.device_count(device).await?;
        rows.push(vec![format!("device {}", device), format!("{} event(s)", count)]);
    }

    Ok(rows)
}
