//! Embedded hierarchical key-value store.
//!
//! Data lives in nested namespaces addressed by a path of segments. Each
//! namespace holds string values and named child namespaces. Every mutation
//! is appended to an NDJSON journal and synced before it is applied, so a
//! reopened store sees every write that returned `Ok`.
//!
//! # Example
//!
//! ```no_run
//! use tsvwatch_kvtree::{KvTree, SetMode};
//! use std::collections::BTreeMap;
//! use std::path::Path;
//!
//! let tree = KvTree::open(Path::new("/tmp/store.kv")).unwrap();
//! tree.set(&["files"], "a.tsv", "", SetMode::Unique).unwrap();
//!
//! let mut record = BTreeMap::new();
//! record.insert("number".to_string(), "1".to_string());
//! let index = tree.append_child(&["devices", "GUID-1"], record).unwrap();
//! assert_eq!(index, 1);
//! ```

mod journal;
mod namespace;

pub use namespace::Namespace;

use journal::{Journal, JournalEntry};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("key '{key}' already exists")]
    KeyExists { key: String },

    #[error("journal corrupt at line {line}: {message}")]
    Corrupt { line: usize, message: String },

    #[error("Failed to acquire lock")]
    LockPoisoned,
}

/// How [`KvTree::set`] treats an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    Overwrite,
    /// Fail with [`KvError::KeyExists`] if the key is present.
    Unique,
}

struct Inner {
    root: Namespace,
    journal: Option<Journal>,
}

impl Inner {
    fn commit(&mut self, entry: JournalEntry) -> Result<(), KvError> {
        if let Some(journal) = self.journal.as_mut() {
            journal.append(&entry)?;
        }
        entry.apply(&mut self.root);
        Ok(())
    }
}

/// Thread-safe handle to one store. All operations serialize on one lock.
pub struct KvTree {
    inner: Mutex<Inner>,
}

impl KvTree {
    /// Open the store backed by the journal at `path`, creating it if needed.
    pub fn open(path: &Path) -> Result<Self, KvError> {
        let replayed = Journal::open(path)?;
        tracing::debug!(
            journal = %path.display(),
            entries = replayed.entries,
            "kvtree journal replayed"
        );
        Ok(Self {
            inner: Mutex::new(Inner {
                root: replayed.root,
                journal: Some(replayed.journal),
            }),
        })
    }

    /// Store with no journal. Contents are lost on drop.
    pub fn open_in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner {
                root: Namespace::default(),
                journal: None,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, KvError> {
        self.inner.lock().map_err(|_| KvError::LockPoisoned)
    }

    pub fn set(&self, path: &[&str], key: &str, value: &str, mode: SetMode) -> Result<(), KvError> {
        let mut inner = self.lock()?;
        if mode == SetMode::Unique {
            let exists = inner
                .root
                .lookup(path)
                .map_or(false, |ns| ns.value(key).is_some());
            if exists {
                return Err(KvError::KeyExists {
                    key: key.to_string(),
                });
            }
        }
        inner.commit(JournalEntry::Set {
            path: to_owned_path(path),
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn get(&self, path: &[&str], key: &str) -> Result<Option<String>, KvError> {
        let inner = self.lock()?;
        Ok(inner
            .root
            .lookup(path)
            .and_then(|ns| ns.value(key))
            .map(str::to_string))
    }

    /// Keys of the values stored directly in `path`, sorted.
    pub fn keys(&self, path: &[&str]) -> Result<Vec<String>, KvError> {
        let inner = self.lock()?;
        Ok(inner
            .root
            .lookup(path)
            .map(|ns| ns.values().keys().cloned().collect())
            .unwrap_or_default())
    }

    /// Values stored directly in `path`, or `None` if the namespace does not exist.
    pub fn entries(&self, path: &[&str]) -> Result<Option<BTreeMap<String, String>>, KvError> {
        let inner = self.lock()?;
        Ok(inner.root.lookup(path).map(|ns| ns.values().clone()))
    }

    pub fn child_count(&self, path: &[&str]) -> Result<u64, KvError> {
        let inner = self.lock()?;
        Ok(inner
            .root
            .lookup(path)
            .map_or(0, |ns| ns.child_count() as u64))
    }

    /// Reserve the next child slot of `path` and fill it with `values`.
    ///
    /// The slot is named `count + 1` (1-based) and the reservation and write
    /// happen under one lock, so concurrent appends never share a slot.
    pub fn append_child(
        &self,
        path: &[&str],
        values: BTreeMap<String, String>,
    ) -> Result<u64, KvError> {
        let mut inner = self.lock()?;
        let index = inner
            .root
            .lookup(path)
            .map_or(0, |ns| ns.child_count() as u64)
            + 1;
        inner.commit(JournalEntry::Append {
            path: to_owned_path(path),
            index,
            values,
        })?;
        Ok(index)
    }
}

fn to_owned_path(path: &[&str]) -> Vec<String> {
    path.iter().map(|s| s.to_string()).collect()
}
