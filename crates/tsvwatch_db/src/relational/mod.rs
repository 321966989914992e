//! Relational backend (SQLite, PostgreSQL) over `sqlx`'s Any driver.
//!
//! Events live in one flat `events` table. Reads for a device are ordered by
//! the `seq` surrogate key, which the database assigns in insertion order, so
//! ordinal lookups see records in the order they were persisted.

mod migrations;
mod statements;

pub use statements::{Dialect, StatementCache, StatementName};

use crate::config::{BackendKind, StorageConfig};
use crate::error::{Result, StorageError};
use crate::traits::{EventStore, FilenameSink};
use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use tracing::{info, warn};
use tsvwatch_protocol::{Event, EventId, FieldKind, FieldValue, EVENT_FIELDS};

pub struct RelationalStore {
    pool: AnyPool,
    statements: StatementCache,
    backend: BackendKind,
}

impl RelationalStore {
    /// Connect, apply pending schema changes and prepare every statement.
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        let dialect = match config.backend {
            BackendKind::Sqlite => Dialect::Sqlite,
            BackendKind::Postgres => Dialect::Postgres,
            BackendKind::KvTree => {
                return Err(StorageError::InvalidConfig(
                    "kvtree is not a relational backend".to_string(),
                ))
            }
        };
        ensure_compiled(config.backend)?;
        let target = ConnectionTarget::resolve(dialect, &config.dsn)?;

        sqlx::any::install_default_drivers();

        let mut options = AnyPoolOptions::new().max_connections(config.max_connections);
        if target.in_memory {
            // Every SQLite connection to :memory: is its own database.
            options = options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = options.connect(&target.url).await?;

        if dialect == Dialect::Sqlite && !target.in_memory {
            apply_sqlite_optimizations(&pool).await?;
        }

        migrations::apply(&pool, dialect).await?;

        let statements = StatementCache::new(dialect);
        statements.prepare_all(&pool).await?;

        info!(backend = %config.backend, "relational store opened");
        Ok(Self {
            pool,
            statements,
            backend: config.backend,
        })
    }

    fn sql(&self, name: StatementName) -> &str {
        self.statements.get(name)
    }

    async fn insert_event(&self, event: &Event) -> Result<()> {
        let mut query = sqlx::query(self.sql(StatementName::InsertEvent))
            .persistent(true)
            .bind(event.id.as_str());
        for field in EVENT_FIELDS.iter() {
            query = match (field.get)(event) {
                FieldValue::Text(s) => query.bind(s),
                FieldValue::Integer(n) => query.bind(n),
                FieldValue::Boolean(b) => query.bind(i64::from(b)),
            };
        }
        query.execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for RelationalStore {
    fn backend(&self) -> BackendKind {
        self.backend
    }

    async fn record_filename(&self, name: &str, error: Option<&str>) -> Result<()> {
        let result = sqlx::query(self.sql(StatementName::InsertFilename))
            .persistent(true)
            .bind(name)
            .bind(error.unwrap_or(""))
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StorageError::DuplicateFilename(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn load_filenames(&self, sink: &mut (dyn FilenameSink + Send)) -> Result<()> {
        let rows = sqlx::query(self.sql(StatementName::SelectFilenames))
            .persistent(true)
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let name: String = row.try_get("name")?;
            sink.add_file(&name);
        }
        Ok(())
    }

    async fn filename_error(&self, name: &str) -> Result<Option<String>> {
        let row = sqlx::query(self.sql(StatementName::SelectFilenameError))
            .persistent(true)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get("error")?)),
            None => Ok(None),
        }
    }

    async fn persist(&self, events: &[Event]) -> Result<()> {
        for (written, event) in events.iter().enumerate() {
            if let Err(e) = self.insert_event(event).await {
                warn!(
                    written,
                    total = events.len(),
                    event_id = %event.id,
                    error = %e,
                    "persist stopped at failing record"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    async fn get_by_ordinal(&self, unit_guid: &str, ordinal: i64) -> Result<Event> {
        if ordinal <= 0 {
            return Err(StorageError::not_found(format!(
                "ordinal {} for device {}",
                ordinal, unit_guid
            )));
        }

        let row = sqlx::query(self.sql(StatementName::SelectEventByOrdinal))
            .persistent(true)
            .bind(unit_guid)
            .bind(ordinal - 1)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => event_from_row(&row),
            None => Err(StorageError::not_found(format!(
                "ordinal {} for device {}",
                ordinal, unit_guid
            ))),
        }
    }

    async fn device_count(&self, unit_guid: &str) -> Result<u64> {
        let total: i64 = sqlx::query(self.sql(StatementName::CountDeviceEvents))
            .persistent(true)
            .bind(unit_guid)
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;
        Ok(total.max(0) as u64)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn event_from_row(row: &AnyRow) -> Result<Event> {
    let raw_id: String = row.try_get("id")?;
    let id = EventId::parse(&raw_id)
        .map_err(|e| StorageError::unavailable_from("stored event has an invalid ID", e))?;

    let mut event = Event {
        id,
        ..Event::default()
    };
    for field in EVENT_FIELDS.iter() {
        let value = match field.kind {
            FieldKind::Text => FieldValue::Text(row.try_get(field.key)?),
            FieldKind::Integer => FieldValue::Integer(row.try_get(field.key)?),
            FieldKind::Boolean => FieldValue::Boolean(row.try_get::<i64, _>(field.key)? != 0),
        };
        field
            .apply(&mut event, value)
            .map_err(|e| StorageError::unavailable_from("stored event does not match field table", e))?;
    }
    Ok(event)
}

#[cfg(feature = "sqlite")]
fn sqlite_compiled() -> bool {
    true
}

#[cfg(not(feature = "sqlite"))]
fn sqlite_compiled() -> bool {
    false
}

#[cfg(feature = "postgres")]
fn postgres_compiled() -> bool {
    true
}

#[cfg(not(feature = "postgres"))]
fn postgres_compiled() -> bool {
    false
}

fn ensure_compiled(backend: BackendKind) -> Result<()> {
    let (compiled, feature) = match backend {
        BackendKind::Sqlite => (sqlite_compiled(), "sqlite"),
        BackendKind::Postgres => (postgres_compiled(), "postgres"),
        BackendKind::KvTree => (true, ""),
    };
    if compiled {
        Ok(())
    } else {
        Err(StorageError::InvalidConfig(format!(
            "backend {} not compiled in, rebuild with the '{}' feature",
            backend, feature
        )))
    }
}

struct ConnectionTarget {
    url: String,
    in_memory: bool,
}

impl ConnectionTarget {
    fn resolve(dialect: Dialect, dsn: &str) -> Result<Self> {
        match dialect {
            Dialect::Sqlite => Self::sqlite(dsn),
            Dialect::Postgres => {
                if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
                    Ok(Self {
                        url: dsn.to_string(),
                        in_memory: false,
                    })
                } else {
                    Err(StorageError::InvalidConfig(format!(
                        "postgres backend needs a postgres:// URL, got '{}'",
                        dsn
                    )))
                }
            }
        }
    }

    fn sqlite(dsn: &str) -> Result<Self> {
        if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
            return Err(StorageError::InvalidConfig(format!(
                "sqlite backend cannot use '{}'",
                dsn
            )));
        }
        let url = if dsn.starts_with("sqlite:") {
            dsn.to_string()
        } else {
            format!("sqlite:{}", dsn)
        };

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        if in_memory {
            return Ok(Self { url, in_memory });
        }

        let path = url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");
        let path = path.split('?').next().unwrap_or(path);
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::unavailable_from(
                        format!("cannot create database directory {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let url = if url.contains("mode=") {
            url
        } else if url.contains('?') {
            format!("{}&mode=rwc", url)
        } else {
            format!("{}?mode=rwc", url)
        };
        Ok(Self { url, in_memory })
    }
}

/// WAL mode for concurrent readers alongside the single writer.
async fn apply_sqlite_optimizations(pool: &AnyPool) -> Result<()> {
    sqlx::query("PRAGMA journal_mode=WAL")
        .persistent(false)
        .execute(pool)
        .await?;
    Ok(())
}
