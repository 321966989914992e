//! tsvwatch: directory-polling TSV ingestion with ordinal point lookup.
//!
//! A [`Watcher`] polls one directory and queues every new `*.tsv` file, the
//! [`Pipeline`] parses each file into events, records the outcome in the
//! filename ledger and persists the events through an
//! [`EventStore`](tsvwatch_db::EventStore). [`EventLookup`] answers
//! "the N-th event of device G" against the same store.

pub mod config;
pub mod lookup;
pub mod parser;
pub mod pipeline;
pub mod watcher;

pub use config::{ConfigError, StorageSection, WatchConfig};
pub use lookup::{EventLookup, LookupError, LookupRequest};
pub use parser::{parse_file, EventReader, ParseError};
pub use pipeline::{
    BatchObserver, FileOutcome, FileReport, LoggingObserver, Pipeline, PipelineConfig,
    PipelineError, PipelineSummary,
};
pub use watcher::{WatchError, Watcher};
