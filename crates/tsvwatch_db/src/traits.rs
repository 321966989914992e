//! Storage abstraction traits.
//!
//! [`EventStore`] is the one contract the ingestion pipeline and the lookup
//! service talk to. Each backend family provides one implementation.

use crate::config::BackendKind;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use tsvwatch_protocol::Event;

/// Receives filenames streamed out of the ledger.
pub trait FilenameSink {
    fn add_file(&mut self, name: &str);
}

impl FilenameSink for HashSet<String> {
    fn add_file(&mut self, name: &str) {
        self.insert(name.to_string());
    }
}

impl FilenameSink for BTreeSet<String> {
    fn add_file(&mut self, name: &str) {
        self.insert(name.to_string());
    }
}

impl FilenameSink for Vec<String> {
    fn add_file(&mut self, name: &str) {
        self.push(name.to_string());
    }
}

/// Filename ledger plus ordinal-addressable event storage.
///
/// Implementations must be safe to share across tasks.
#[async_trait]
pub trait EventStore: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Add a ledger entry. `error` is `None` for a cleanly parsed file.
    ///
    /// Fails with `DuplicateFilename` if `name` is already recorded.
    async fn record_filename(&self, name: &str, error: Option<&str>) -> Result<()>;

    /// Stream every recorded filename into `sink`.
    async fn load_filenames(&self, sink: &mut (dyn FilenameSink + Send)) -> Result<()>;

    /// Error recorded for `name`: `None` if unknown, `Some("")` if clean.
    async fn filename_error(&self, name: &str) -> Result<Option<String>>;

    /// Persist events in order. Stops at the first failing record; records
    /// written before it stay written.
    async fn persist(&self, events: &[Event]) -> Result<()>;

    /// The `ordinal`-th event (1-based) persisted for `unit_guid`.
    async fn get_by_ordinal(&self, unit_guid: &str, ordinal: i64) -> Result<Event>;

    /// Number of events persisted for `unit_guid`.
    async fn device_count(&self, unit_guid: &str) -> Result<u64>;

    async fn close(&self);
}
