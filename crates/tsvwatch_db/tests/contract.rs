//! Behaviour every backend must share.
//!
//! Each check runs against SQLite and kvtree. PostgreSQL runs too when built
//! with `--features postgres` and `TSVWATCH_TEST_POSTGRES_URL` is set.

use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;
use tsvwatch_db::{open_store, EventStore, StorageConfig, StorageError};
use tsvwatch_protocol::{Event, EventId};

struct Backend {
    store: Arc<dyn EventStore>,
    _dir: Option<TempDir>,
}

async fn sqlite() -> Backend {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::sqlite(dir.path().join("events.sqlite3"));
    Backend {
        store: open_store(&config).await.unwrap(),
        _dir: Some(dir),
    }
}

async fn kvtree() -> Backend {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::kvtree(dir.path().join("events.kv"));
    Backend {
        store: open_store(&config).await.unwrap(),
        _dir: Some(dir),
    }
}

#[cfg(feature = "postgres")]
async fn postgres() -> Option<Backend> {
    let url = std::env::var("TSVWATCH_TEST_POSTGRES_URL").ok()?;
    let config = StorageConfig::new(tsvwatch_db::BackendKind::Postgres, url);
    Some(Backend {
        store: open_store(&config).await.unwrap(),
        _dir: None,
    })
}

/// Names are unique per test so a shared PostgreSQL database stays usable.
fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, EventId::new())
}

fn event(unit_guid: &str, number: i64) -> Event {
    let mut e = Event::new();
    e.unit_guid = unit_guid.to_string();
    e.number = number;
    e.message_text = format!("message {}", number);
    e
}

async fn ordinal_lookup_follows_persistence_order(store: Arc<dyn EventStore>) {
    let device = unique("GUID");
    let other = unique("OTHER");
    let events = vec![
        event(&device, 1),
        event(&other, 1),
        event(&device, 2),
        event(&device, 3),
    ];
    store.persist(&events).await.unwrap();

    let mine: Vec<&Event> = events.iter().filter(|e| e.unit_guid == device).collect();
    for (k, expected) in mine.iter().enumerate() {
        let got = store.get_by_ordinal(&device, k as i64 + 1).await.unwrap();
        assert_eq!(&got, *expected);
    }

    assert_eq!(store.device_count(&device).await.unwrap(), 3);
    assert_eq!(store.device_count(&other).await.unwrap(), 1);

    for bad in [4, 0, -1] {
        let err = store.get_by_ordinal(&device, bad).await.unwrap_err();
        assert!(err.is_not_found(), "ordinal {}: {:?}", bad, err);
    }
    let err = store.get_by_ordinal(&unique("NOPE"), 1).await.unwrap_err();
    assert!(err.is_not_found());
}

async fn later_batches_append_after_earlier_ones(store: Arc<dyn EventStore>) {
    let device = unique("GUID");
    let first = vec![event(&device, 1)];
    let second = vec![event(&device, 1), event(&device, 2)];
    store.persist(&first).await.unwrap();
    store.persist(&second).await.unwrap();

    assert_eq!(store.get_by_ordinal(&device, 1).await.unwrap().id, first[0].id);
    assert_eq!(store.get_by_ordinal(&device, 3).await.unwrap().id, second[1].id);
}

async fn every_field_survives_storage(store: Arc<dyn EventStore>) {
    let device = unique("GUID");
    let mut e = Event::new();
    e.number = 42;
    e.mqtt = "tcp://broker:1883".into();
    e.inventory_id = "INV-7".into();
    e.unit_guid = device.clone();
    e.message_id = "M-1".into();
    e.message_text = "pressure high".into();
    e.context = "ctx".into();
    e.message_class = "alarm".into();
    e.level = -3;
    e.area = "north".into();
    e.address = "DB1.DBX0.1".into();
    e.block = true;
    e.event_type = "warning".into();
    e.bit = 7;
    e.invert_bit = 1;

    store.persist(std::slice::from_ref(&e)).await.unwrap();
    assert_eq!(store.get_by_ordinal(&device, 1).await.unwrap(), e);
}

async fn duplicate_filename_is_reported(store: Arc<dyn EventStore>) {
    let name = unique("a") + ".tsv";
    store.record_filename(&name, None).await.unwrap();
    let err = store.record_filename(&name, Some("later")).await.unwrap_err();
    assert!(matches!(err, StorageError::DuplicateFilename(ref n) if *n == name));
    assert_eq!(store.filename_error(&name).await.unwrap(), Some(String::new()));
}

async fn concurrent_duplicate_filename_succeeds_once(store: Arc<dyn EventStore>) {
    let name = unique("race") + ".tsv";
    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let store = Arc::clone(&store);
            let name = name.clone();
            tokio::spawn(async move { store.record_filename(&name, None).await })
        })
        .collect();

    let mut ok = 0;
    let mut duplicate = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => ok += 1,
            Err(StorageError::DuplicateFilename(_)) => duplicate += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!((ok, duplicate), (1, 1));
}

async fn load_filenames_returns_recorded_names(store: Arc<dyn EventStore>) {
    let a = unique("a") + ".tsv";
    let b = unique("b") + ".tsv";
    store.record_filename(&a, None).await.unwrap();
    store.record_filename(&b, Some("bad header")).await.unwrap();

    let mut seen: HashSet<String> = HashSet::new();
    store.load_filenames(&mut seen).await.unwrap();
    assert!(seen.contains(&a));
    assert!(seen.contains(&b));

    assert_eq!(
        store.filename_error(&b).await.unwrap().as_deref(),
        Some("bad header")
    );
    assert_eq!(store.filename_error(&unique("missing")).await.unwrap(), None);
}

macro_rules! contract_tests {
    ($($check:ident),* $(,)?) => {
        mod sqlite_backend {
            use super::*;
            $(
                #[tokio::test]
                async fn $check() {
                    let backend = sqlite().await;
                    super::$check(Arc::clone(&backend.store)).await;
                    backend.store.close().await;
                }
            )*
        }

        mod kvtree_backend {
            use super::*;
            $(
                #[tokio::test]
                async fn $check() {
                    let backend = kvtree().await;
                    super::$check(Arc::clone(&backend.store)).await;
                }
            )*
        }

        #[cfg(feature = "postgres")]
        mod postgres_backend {
            use super::*;
            $(
                #[tokio::test]
                async fn $check() {
                    match postgres().await {
                        Some(backend) => super::$check(Arc::clone(&backend.store)).await,
                        None => eprintln!("TSVWATCH_TEST_POSTGRES_URL not set, skipping"),
                    }
                }
            )*
        }
    };
}

contract_tests!(
    ordinal_lookup_follows_persistence_order,
    later_batches_append_after_earlier_ones,
    every_field_survives_storage,
    duplicate_filename_is_reported,
    concurrent_duplicate_filename_succeeds_once,
    load_filenames_returns_recorded_names,
);

#[tokio::test]
async fn relational_persist_keeps_records_before_a_failure() {
    let backend = sqlite().await;
    let store = &backend.store;
    let device = unique("GUID");

    let first = event(&device, 1);
    let second = event(&device, 2);
    // Reusing an identity violates the events.id constraint.
    let mut clash = event(&device, 3);
    clash.id = first.id.clone();
    let never = event(&device, 4);

    let err = store
        .persist(&[first.clone(), second.clone(), clash, never])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Unavailable { .. }));

    assert_eq!(store.device_count(&device).await.unwrap(), 2);
    assert_eq!(store.get_by_ordinal(&device, 2).await.unwrap(), second);
    assert!(store.get_by_ordinal(&device, 3).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn ledger_and_events_survive_reopen() {
    let makers: [fn(&TempDir) -> StorageConfig; 2] = [
        |dir| StorageConfig::sqlite(dir.path().join("events.sqlite3")),
        |dir| StorageConfig::kvtree(dir.path().join("events.kv")),
    ];
    for make in makers {
        let dir = TempDir::new().unwrap();
        let config = make(&dir);
        let e = event("GUID-1", 1);

        {
            let store = open_store(&config).await.unwrap();
            store.record_filename("a.tsv", None).await.unwrap();
            store.persist(std::slice::from_ref(&e)).await.unwrap();
            store.close().await;
        }

        let store = open_store(&config).await.unwrap();
        let mut names = Vec::new();
        store.load_filenames(&mut names).await.unwrap();
        assert_eq!(names, vec!["a.tsv".to_string()]);
        assert_eq!(store.get_by_ordinal("GUID-1", 1).await.unwrap(), e);
        assert!(matches!(
            store.record_filename("a.tsv", None).await,
            Err(StorageError::DuplicateFilename(_))
        ));
        store.close().await;
    }
}

#[tokio::test]
async fn in_memory_backends_work() {
    for config in [StorageConfig::sqlite_memory(), StorageConfig::kvtree_memory()] {
        let store = open_store(&config).await.unwrap();
        store.record_filename("a.tsv", None).await.unwrap();
        store.persist(&[event("G", 1)]).await.unwrap();
        assert_eq!(store.device_count("G").await.unwrap(), 1);
    }
}

#[tokio::test]
async fn kvtree_rejects_empty_path() {
    let config = StorageConfig::new(tsvwatch_db::BackendKind::KvTree, "kvtree:");
    assert!(matches!(
        open_store(&config).await,
        Err(StorageError::InvalidConfig(_))
    ));
}
