//! Shared data model for tsvwatch.
//!
//! - [`Event`]: one parsed TSV record with its parse-time [`EventId`]
//! - [`EVENT_FIELDS`]: static (column, key, accessor, mutator) table
//! - [`EventBatch`]: one file's events plus the visit primitive used by
//!   report consumers

pub mod batch;
pub mod event;
pub mod ids;

pub use batch::{DeviceGroup, EventBatch};
pub use event::{
    field_by_column, field_by_key, Event, FieldError, FieldKind, FieldSpec, FieldValue,
    EVENT_FIELDS,
};
pub use ids::{EventId, IdParseError};

/// Extension of files picked up by the watcher.
pub const TSV_EXTENSION: &str = ".tsv";
