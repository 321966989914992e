//! Hierarchical key-value backend over [`tsvwatch_kvtree`].
//!
//! Layout:
//!
//! ```text
//! files/<filename>            = <error or "">
//! devices/<unit_guid>/<n>/id  = <event id>
//! devices/<unit_guid>/<n>/<field key> = <encoded value>
//! ```
//!
//! `<n>` counts from 1 in persistence order and is reserved atomically by
//! [`KvTree::append_child`].

use crate::config::{BackendKind, StorageConfig};
use crate::error::{Result, StorageError};
use crate::traits::{EventStore, FilenameSink};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tsvwatch_kvtree::{KvError, KvTree, SetMode};
use tsvwatch_protocol::{Event, EventId, EVENT_FIELDS};

const FILES: &str = "files";
const DEVICES: &str = "devices";
const ID_KEY: &str = "id";

pub struct KvTreeStore {
    tree: Arc<KvTree>,
}

impl KvTreeStore {
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let dsn = config.dsn.trim();
        let dsn = dsn.strip_prefix("kvtree:").unwrap_or(dsn);

        if dsn.is_empty() {
            return Err(StorageError::InvalidConfig(
                "kvtree backend needs a journal path".to_string(),
            ));
        }

        let tree = if dsn == ":memory:" {
            KvTree::open_in_memory()
        } else {
            let path = PathBuf::from(dsn);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StorageError::unavailable_from(
                            format!("cannot create store directory {}", parent.display()),
                            e,
                        )
                    })?;
                }
            }
            KvTree::open(&path)?
        };

        tracing::info!(journal = dsn, "kvtree store opened");
        Ok(Self {
            tree: Arc::new(tree),
        })
    }

    /// Run a blocking engine call off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&KvTree) -> Result<T> + Send + 'static,
    {
        let tree = Arc::clone(&self.tree);
        tokio::task::spawn_blocking(move || f(&tree)).await?
    }
}

fn encode_event(event: &Event) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    values.insert(ID_KEY.to_string(), event.id.to_string());
    for field in EVENT_FIELDS.iter() {
        values.insert(field.key.to_string(), (field.get)(event).encode());
    }
    values
}

fn decode_event(values: &BTreeMap<String, String>) -> Result<Event> {
    let raw_id = values
        .get(ID_KEY)
        .ok_or_else(|| StorageError::unavailable("stored event has no ID"))?;
    let id = EventId::parse(raw_id)
        .map_err(|e| StorageError::unavailable_from("stored event has an invalid ID", e))?;

    let mut event = Event {
        id,
        ..Event::default()
    };
    for field in EVENT_FIELDS.iter() {
        let raw = values.get(field.key).map(String::as_str).unwrap_or("");
        field
            .decode_into(&mut event, raw)
            .map_err(|e| StorageError::unavailable_from("stored event field is unreadable", e))?;
    }
    Ok(event)
}

#[async_trait]
impl EventStore for KvTreeStore {
    fn backend(&self) -> BackendKind {
        BackendKind::KvTree
    }

    async fn record_filename(&self, name: &str, error: Option<&str>) -> Result<()> {
        let name = name.to_string();
        let error = error.unwrap_or("").to_string();
        self.blocking(move |tree| {
            match tree.set(&[FILES], &name, &error, SetMode::Unique) {
                Ok(()) => Ok(()),
                Err(KvError::KeyExists { .. }) => Err(StorageError::DuplicateFilename(name)),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn load_filenames(&self, sink: &mut (dyn FilenameSink + Send)) -> Result<()> {
        let names = self.blocking(|tree| Ok(tree.keys(&[FILES])?)).await?;
        for name in &names {
            sink.add_file(name);
        }
        Ok(())
    }

    async fn filename_error(&self, name: &str) -> Result<Option<String>> {
        let name = name.to_string();
        self.blocking(move |tree| Ok(tree.get(&[FILES], &name)?))
            .await
    }

    async fn persist(&self, events: &[Event]) -> Result<()> {
        let records: Vec<(String, BTreeMap<String, String>)> = events
            .iter()
            .map(|e| (e.unit_guid.clone(), encode_event(e)))
            .collect();
        let total = records.len();

        self.blocking(move |tree| {
            for (written, (unit_guid, values)) in records.into_iter().enumerate() {
                if let Err(e) = tree.append_child(&[DEVICES, unit_guid.as_str()], values) {
                    tracing::warn!(
                        written,
                        total,
                        unit_guid = %unit_guid,
                        error = %e,
                        "persist stopped at failing record"
                    );
                    return Err(e.into());
                }
            }
            Ok(())
        })
        .await
    }

    async fn get_by_ordinal(&self, unit_guid: &str, ordinal: i64) -> Result<Event> {
        if ordinal <= 0 {
            return Err(StorageError::not_found(format!(
                "ordinal {} for device {}",
                ordinal, unit_guid
            )));
        }

        let guid = unit_guid.to_string();
        let slot = ordinal.to_string();
        let values = self
            .blocking(move |tree| Ok(tree.entries(&[DEVICES, guid.as_str(), slot.as_str()])?))
            .await?;

        match values {
            Some(values) => decode_event(&values),
            None => Err(StorageError::not_found(format!(
                "ordinal {} for device {}",
                ordinal, unit_guid
            ))),
        }
    }

    async fn device_count(&self, unit_guid: &str) -> Result<u64> {
        let guid = unit_guid.to_string();
        self.blocking(move |tree| Ok(tree.child_count(&[DEVICES, guid.as_str()])?))
            .await
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_event_decodes_to_itself() {
        let mut event = Event::new();
        event.unit_guid = "GUID-1".to_string();
        event.message_text = "hello\tworld".to_string();
        event.block = true;
        event.invert_bit = -1;

        let values = encode_event(&event);
        assert_eq!(values.len(), EVENT_FIELDS.len() + 1);
        assert_eq!(decode_event(&values).unwrap(), event);
    }

    #[test]
    fn missing_id_is_unavailable() {
        let values = BTreeMap::new();
        assert!(matches!(
            decode_event(&values),
            Err(StorageError::Unavailable { .. })
        ));
    }
}
