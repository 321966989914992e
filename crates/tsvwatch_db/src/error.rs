//! Error types for the storage layer.

use thiserror::Error;
use tsvwatch_kvtree::KvError;

/// Storage operation result type.
pub type Result<T> = std::result::Result<T, StorageError>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Storage errors, as seen by the pipeline and the lookup service.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The ledger already holds this filename.
    #[error("Filename already recorded: {0}")]
    DuplicateFilename(String),

    /// No record at this ordinal, or the device is unknown.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other backend fault (I/O, connectivity, corrupt data).
    #[error("Storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Storage settings that cannot work, detected before any I/O.
    #[error("Invalid storage configuration: {0}")]
    InvalidConfig(String),
}

impl StorageError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable {
            message: msg.into(),
            source: None,
        }
    }

    pub fn unavailable_from(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Unavailable {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        Self::unavailable_from(err.to_string(), err)
    }
}

impl From<KvError> for StorageError {
    fn from(err: KvError) -> Self {
        Self::unavailable_from(err.to_string(), err)
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::unavailable_from("storage task failed", err)
    }
}
