//! Polling directory watcher.
//!
//! Each tick takes a full listing of the watched directory and publishes
//! every unseen `*.tsv` filename to a bounded queue. Polling instead of
//! inotify keeps this working on network filesystems.
//!
//! A name is added to the dedup set right after it is published. The set
//! lives in memory only and is rebuilt from the ledger on start, so a file
//! queued but not yet recorded when the process died is published again.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tsvwatch_db::FilenameSink;
use tsvwatch_protocol::TSV_EXTENSION;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("cannot read watch directory {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The consumer went away. A normal way for the watcher to stop.
    #[error("filename queue closed")]
    QueueClosed,
}

pub struct Watcher {
    dir: PathBuf,
    interval: Duration,
    seen: HashSet<String>,
    tx: mpsc::Sender<String>,
}

impl Watcher {
    pub fn new(dir: impl Into<PathBuf>, interval: Duration, tx: mpsc::Sender<String>) -> Self {
        Self {
            dir: dir.into(),
            interval,
            seen: HashSet::new(),
            tx,
        }
    }

    /// Watcher plus the receiving end of a queue of `capacity` filenames.
    pub fn with_queue(
        dir: impl Into<PathBuf>,
        interval: Duration,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(dir, interval, tx), rx)
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    pub fn known_count(&self) -> usize {
        self.seen.len()
    }

    /// One scanning pass. Returns how many names were published.
    ///
    /// Waits for queue space rather than dropping names.
    pub async fn scan_once(&mut self) -> Result<usize, WatchError> {
        let unreadable = |source| WatchError::Unreadable {
            path: self.dir.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(unreadable)?;

        let mut fresh = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
            match entry.file_type().await {
                Ok(ft) if ft.is_dir() => continue,
                Ok(_) => {}
                Err(e) => {
                    warn!(entry = %entry.path().display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.ends_with(TSV_EXTENSION) && !self.seen.contains(&name) {
                fresh.push(name);
            }
        }
        fresh.sort();

        let published = fresh.len();
        for name in fresh {
            self.tx
                .send(name.clone())
                .await
                .map_err(|_| WatchError::QueueClosed)?;
            debug!(file = %name, "published");
            self.seen.insert(name);
        }
        Ok(published)
    }

    /// Poll every interval until cancelled, the queue closes, or the
    /// directory becomes unreadable. The first scan runs one interval after
    /// start.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), WatchError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately, skip it
        ticker.tick().await;

        info!(dir = %self.dir.display(), interval = ?self.interval, "watcher started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("watcher cancelled");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            match self.scan_once().await {
                Ok(0) => {}
                Ok(published) => debug!(published, "scan complete"),
                Err(WatchError::QueueClosed) => {
                    info!("filename queue closed, watcher stopping");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl FilenameSink for Watcher {
    fn add_file(&mut self, name: &str) {
        self.seen.insert(name.to_string());
    }
}
