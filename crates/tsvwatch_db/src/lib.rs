//! Storage abstraction for tsvwatch.
//!
//! One contract ([`EventStore`]) over two backend families:
//!
//! - [`RelationalStore`]: SQLite or PostgreSQL through sqlx, one flat table,
//!   statements prepared once per store
//! - [`KvTreeStore`]: nested namespaces in the embedded kvtree engine
//!
//! # Usage
//!
//! ```rust,ignore
//! use tsvwatch_db::{open_store, StorageConfig};
//!
//! let store = open_store(&StorageConfig::sqlite("/var/lib/tsvwatch/events.sqlite3")).await?;
//! store.record_filename("a.tsv", None).await?;
//! let first = store.get_by_ordinal("GUID-1", 1).await?;
//! ```

mod config;
mod error;
mod kv;
mod relational;
mod traits;

pub use config::{BackendKind, StorageConfig, UnknownBackend};
pub use error::{Result, StorageError};
pub use kv::KvTreeStore;
pub use relational::{Dialect, RelationalStore, StatementCache, StatementName};
pub use traits::{EventStore, FilenameSink};

use std::sync::Arc;

/// Open the backend named by `config`.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn EventStore>> {
    match config.backend {
        BackendKind::Sqlite | BackendKind::Postgres => {
            Ok(Arc::new(RelationalStore::open(config).await?))
        }
        BackendKind::KvTree => Ok(Arc::new(KvTreeStore::open(config)?)),
    }
}
