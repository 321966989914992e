//! Command-line interface for tsvwatch.
//!
//! Every command resolves its configuration the same way: the TOML file given
//! with `--config` (if any), then flag and environment overrides.

pub mod get;
pub mod ingest;
pub mod output;
pub mod status;
pub mod watch;

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tsvwatch::WatchConfig;
use tsvwatch_db::{open_store, EventStore};

/// Storage selection shared by all commands.
#[derive(Args, Debug, Clone, Default)]
pub struct StorageArgs {
    /// Configuration file (TOML)
    #[arg(short, long, env = "TSVWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Storage backend: sqlite, postgres or kvtree
    #[arg(long, env = "TSVWATCH_BACKEND")]
    pub backend: Option<String>,

    /// Connection URL, or journal path for kvtree
    #[arg(long, env = "TSVWATCH_DSN")]
    pub dsn: Option<String>,
}

impl StorageArgs {
    /// Config file contents with the storage overrides applied.
    pub fn load_config(&self) -> Result<WatchConfig> {
        let mut config = match &self.config {
            Some(path) => WatchConfig::load(path)?,
            None => WatchConfig::default(),
        };
        if let Some(backend) = &self.backend {
            config.storage.backend = backend.clone();
            // A DSN from the file belongs to the file's backend
            config.storage.dsn = None;
        }
        if let Some(dsn) = &self.dsn {
            config.storage.dsn = Some(dsn.clone());
        }
        Ok(config)
    }

    pub async fn open(&self, config: &WatchConfig) -> Result<Arc<dyn EventStore>> {
        let storage = config.storage.resolve()?;
        open_store(&storage)
            .await
            .with_context(|| format!("Failed to open {} storage at {}", storage.backend, storage.dsn))
    }
}
