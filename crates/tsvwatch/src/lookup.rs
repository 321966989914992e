//! Point lookup of persisted events by device and ordinal.

use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use tsvwatch_db::{EventStore, StorageError};
use tsvwatch_protocol::Event;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("bad request: {0}")]
    BadInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("internal error")]
    Internal,
}

impl From<StorageError> for LookupError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => LookupError::NotFound(what),
            StorageError::Unavailable { .. } | StorageError::InvalidConfig(_) => {
                LookupError::Unavailable(err.to_string())
            }
            StorageError::DuplicateFilename(name) => {
                tracing::error!(file = %name, "ledger conflict on a read path");
                LookupError::Internal
            }
        }
    }
}

/// Body of a lookup request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LookupRequest {
    pub unit_guid: String,
    pub page: i64,
}

#[derive(Clone)]
pub struct EventLookup {
    store: Arc<dyn EventStore>,
}

impl EventLookup {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// The `ordinal`-th event persisted for `unit_guid`, 1-based.
    pub async fn get_by_ordinal(&self, unit_guid: &str, ordinal: i64) -> Result<Event, LookupError> {
        if ordinal <= 0 {
            return Err(LookupError::NotFound(format!(
                "ordinal {} for device {}",
                ordinal, unit_guid
            )));
        }
        debug!(unit_guid, ordinal, "lookup");
        Ok(self.store.get_by_ordinal(unit_guid, ordinal).await?)
    }

    /// Decode a JSON `{"unit_guid": .., "page": ..}` body and look it up.
    pub async fn handle_request(&self, body: &[u8]) -> Result<Event, LookupError> {
        let request: LookupRequest =
            serde_json::from_slice(body).map_err(|e| LookupError::BadInput(e.to_string()))?;
        if request.unit_guid.is_empty() {
            return Err(LookupError::BadInput("unit_guid is empty".to_string()));
        }
        self.get_by_ordinal(&request.unit_guid, request.page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsvwatch_db::{open_store, StorageConfig};
    use tsvwatch_protocol::EventId;

    async fn lookup_with(events: &[(&str, i64)]) -> EventLookup {
        let store = open_store(&StorageConfig::kvtree_memory()).await.unwrap();
        let events: Vec<Event> = events
            .iter()
            .map(|(guid, n)| Event {
                id: EventId::new(),
                unit_guid: guid.to_string(),
                number: *n,
                ..Event::default()
            })
            .collect();
        store.persist(&events).await.unwrap();
        EventLookup::new(store)
    }

    #[tokio::test]
    async fn ordinals_follow_persistence_order() {
        let lookup = lookup_with(&[("G", 10), ("H", 1), ("G", 20)]).await;
        assert_eq!(lookup.get_by_ordinal("G", 1).await.unwrap().number, 10);
        assert_eq!(lookup.get_by_ordinal("G", 2).await.unwrap().number, 20);
        assert!(matches!(
            lookup.get_by_ordinal("G", 3).await,
            Err(LookupError::NotFound(_))
        ));
        assert!(matches!(
            lookup.get_by_ordinal("nobody", 1).await,
            Err(LookupError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn non_positive_ordinals_are_not_found() {
        let lookup = lookup_with(&[("G", 1)]).await;
        for ordinal in [0, -1, i64::MIN] {
            assert!(matches!(
                lookup.get_by_ordinal("G", ordinal).await,
                Err(LookupError::NotFound(_))
            ));
        }
    }

    #[tokio::test]
    async fn request_bodies_are_decoded_strictly() {
        let lookup = lookup_with(&[("G", 7)]).await;

        let event = lookup
            .handle_request(br#"{"unit_guid":"G","page":1}"#)
            .await
            .unwrap();
        assert_eq!(event.number, 7);

        for body in [
            &br#"{"unit_guid":"G"}"#[..],
            br#"{"unit_guid":"G","page":"one"}"#,
            br#"{"unit_guid":"G","page":1,"extra":true}"#,
            br#"{"unit_guid":"","page":1}"#,
            b"not json",
        ] {
            assert!(matches!(
                lookup.handle_request(body).await,
                Err(LookupError::BadInput(_))
            ));
        }

        assert!(matches!(
            lookup.handle_request(br#"{"unit_guid":"G","page":0}"#).await,
            Err(LookupError::NotFound(_))
        ));
    }

    #[test]
    fn storage_errors_map_to_request_errors() {
        assert!(matches!(
            LookupError::from(StorageError::not_found("x")),
            LookupError::NotFound(_)
        ));
        assert!(matches!(
            LookupError::from(StorageError::unavailable("down")),
            LookupError::Unavailable(_)
        ));
        assert!(matches!(
            LookupError::from(StorageError::InvalidConfig("feature missing".into())),
            LookupError::Unavailable(_)
        ));
        assert!(matches!(
            LookupError::from(StorageError::DuplicateFilename("a.tsv".into())),
            LookupError::Internal
        ));
    }
}
