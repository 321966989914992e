//! Ingestion pipeline: hydrate the watcher from the ledger, then turn each
//! published filename into a ledger entry and persisted events.

use crate::config::WatchConfig;
use crate::parser::parse_file;
use crate::watcher::{WatchError, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tsvwatch_db::{EventStore, StorageError};
use tsvwatch_protocol::EventBatch;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot load ledger filenames: {0}")]
    Hydrate(#[source] StorageError),

    #[error("watcher failed: {0}")]
    Watch(#[from] WatchError),

    #[error("watcher task failed: {0}")]
    WatcherTask(#[from] tokio::task::JoinError),
}

/// Receives every successfully persisted batch. Report generators hook in here.
pub trait BatchObserver: Send + Sync {
    fn on_batch(&self, batch: &EventBatch);
}

/// Logs how many events each device received.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl BatchObserver for LoggingObserver {
    fn on_batch(&self, batch: &EventBatch) {
        for group in batch.device_groups() {
            info!(
                file = batch.source(),
                unit_guid = group.unit_guid,
                events = group.events.len(),
                "device batch persisted"
            );
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub directory: PathBuf,
    pub refresh: Duration,
    pub queue_capacity: usize,
}

impl From<&WatchConfig> for PipelineConfig {
    fn from(config: &WatchConfig) -> Self {
        Self {
            directory: config.directory(),
            refresh: config.refresh_interval(),
            queue_capacity: config.queue_capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Ingested { events: usize },
    ParseFailed(String),
    PersistFailed(String),
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub name: String,
    pub outcome: FileOutcome,
    /// Set when the ledger write failed; processing went on regardless.
    pub ledger_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub files_ingested: u64,
    pub files_failed: u64,
    pub events_persisted: u64,
    pub persist_failures: u64,
    pub ledger_failures: u64,
}

impl PipelineSummary {
    fn record(&mut self, report: &FileReport) {
        if report.ledger_error.is_some() {
            self.ledger_failures += 1;
        }
        match &report.outcome {
            FileOutcome::Ingested { events } => {
                self.files_ingested += 1;
                self.events_persisted += *events as u64;
            }
            FileOutcome::ParseFailed(_) => self.files_failed += 1,
            FileOutcome::PersistFailed(_) => self.persist_failures += 1,
        }
    }
}

pub struct Pipeline {
    store: Arc<dyn EventStore>,
    config: PipelineConfig,
    observer: Option<Arc<dyn BatchObserver>>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn EventStore>, config: PipelineConfig) -> Self {
        Self {
            store,
            config,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn BatchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run until `cancel` fires or the watcher stops.
    ///
    /// The watcher's dedup set is filled from the ledger before its poll loop
    /// starts. A file already taken off the queue is finished before the loop
    /// checks for cancellation again.
    pub async fn run(&self, cancel: CancellationToken) -> Result<PipelineSummary, PipelineError> {
        let (mut watcher, mut rx) = Watcher::with_queue(
            &self.config.directory,
            self.config.refresh,
            self.config.queue_capacity,
        );
        self.store
            .load_filenames(&mut watcher)
            .await
            .map_err(PipelineError::Hydrate)?;
        info!(
            known = watcher.known_count(),
            backend = %self.store.backend(),
            "ledger hydrated"
        );

        let watch_task = tokio::spawn(watcher.run(cancel.clone()));

        let mut summary = PipelineSummary::default();
        loop {
            let name = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(name) => name,
                    None => break,
                },
            };
            let report = self.ingest_file(&name).await;
            summary.record(&report);
        }

        // Unblocks a watcher waiting on a full queue.
        drop(rx);
        watch_task.await??;

        info!(
            ingested = summary.files_ingested,
            failed = summary.files_failed,
            events = summary.events_persisted,
            "pipeline stopped"
        );
        Ok(summary)
    }

    /// Parse `<directory>/<name>`, record the outcome in the ledger and
    /// persist the events if parsing succeeded.
    pub async fn ingest_file(&self, name: &str) -> FileReport {
        let path = self.config.directory.join(name);
        let parsed = match tokio::task::spawn_blocking(move || parse_file(&path)).await {
            Ok(Ok(batch)) => Ok(batch),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("parser task failed: {}", e)),
        };

        let ledger_error = self.record_in_ledger(name, parsed.as_ref().err()).await;

        let batch = match parsed {
            Ok(batch) => batch,
            Err(error) => {
                warn!(file = %name, error = %error, "parse failed, file skipped");
                return FileReport {
                    name: name.to_string(),
                    outcome: FileOutcome::ParseFailed(error),
                    ledger_error,
                };
            }
        };

        let outcome = match self.store.persist(batch.events()).await {
            Ok(()) => {
                info!(file = %name, events = batch.len(), "file ingested");
                if let Some(observer) = &self.observer {
                    observer.on_batch(&batch);
                }
                FileOutcome::Ingested {
                    events: batch.len(),
                }
            }
            Err(e) => {
                warn!(file = %name, error = %e, "persist failed");
                FileOutcome::PersistFailed(e.to_string())
            }
        };

        FileReport {
            name: name.to_string(),
            outcome,
            ledger_error,
        }
    }

    async fn record_in_ledger(&self, name: &str, parse_error: Option<&String>) -> Option<String> {
        match self
            .store
            .record_filename(name, parse_error.map(String::as_str))
            .await
        {
            Ok(()) => {
                debug!(file = %name, "ledger entry recorded");
                None
            }
            Err(e @ StorageError::DuplicateFilename(_)) => {
                warn!(file = %name, "file is already in the ledger");
                Some(e.to_string())
            }
            Err(e) => {
                warn!(file = %name, error = %e, "ledger write failed");
                Some(e.to_string())
            }
        }
    }
}
