//! Schema setup for the relational backends.
//!
//! The base schema is written for SQLite and rewritten for PostgreSQL.
//! Applied migrations are tracked by name in `schema_migrations`.

use super::statements::Dialect;
use sqlx::{AnyPool, Row};
use tsvwatch_protocol::{FieldKind, EVENT_FIELDS};

const INITIAL: &str = "0001_initial";

fn base_schema() -> String {
    let mut event_columns = vec![
        "    seq INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
        "    id TEXT NOT NULL UNIQUE".to_string(),
    ];
    for field in EVENT_FIELDS.iter() {
        let column = match field.kind {
            FieldKind::Text => format!("    \"{}\" TEXT NOT NULL DEFAULT ''", field.key),
            // Booleans are stored as 0/1 so every backend decodes them the same way.
            FieldKind::Integer | FieldKind::Boolean => {
                format!("    \"{}\" BIGINT NOT NULL DEFAULT 0", field.key)
            }
        };
        event_columns.push(column);
    }

    format!(
        r#"
-- Ledger of ingested files, error is '' for a clean parse
CREATE TABLE IF NOT EXISTS ingested_files (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    error TEXT NOT NULL DEFAULT '',
    recorded_at TEXT NOT NULL
);

-- One row per parsed event, seq gives insertion order per device
CREATE TABLE IF NOT EXISTS events (
{}
);

CREATE INDEX IF NOT EXISTS idx_events_unit_guid_seq ON events(unit_guid, seq);
"#,
        event_columns.join(",\n")
    )
}

fn migrations_table() -> &'static str {
    r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    applied_at BIGINT NOT NULL
)"#
}

fn for_dialect(sql: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::Sqlite => sql.to_string(),
        Dialect::Postgres => sql
            .replace("seq INTEGER PRIMARY KEY AUTOINCREMENT", "seq BIGSERIAL PRIMARY KEY")
            .replace("id INTEGER PRIMARY KEY AUTOINCREMENT", "id BIGSERIAL PRIMARY KEY"),
    }
}

fn split_statements(sql: &str) -> impl Iterator<Item = String> + '_ {
    sql.split(';')
        .map(|stmt| {
            stmt.lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|stmt| !stmt.trim().is_empty())
}

/// Apply pending schema changes. Safe to run on every open.
pub async fn apply(pool: &AnyPool, dialect: Dialect) -> Result<(), sqlx::Error> {
    sqlx::query(&for_dialect(migrations_table(), dialect))
        .persistent(false)
        .execute(pool)
        .await?;

    let placeholder = match dialect {
        Dialect::Sqlite => "?",
        Dialect::Postgres => "$1",
    };
    let applied = sqlx::query(&format!(
        "SELECT COUNT(*) AS total FROM schema_migrations WHERE name = {}",
        placeholder
    ))
    .persistent(false)
    .bind(INITIAL)
    .fetch_one(pool)
    .await?
    .try_get::<i64, _>("total")?;

    if applied > 0 {
        return Ok(());
    }

    let schema = for_dialect(&base_schema(), dialect);
    for stmt in split_statements(&schema) {
        sqlx::query(&stmt).persistent(false).execute(pool).await?;
    }

    let insert = match dialect {
        Dialect::Sqlite => "INSERT INTO schema_migrations (name, applied_at) VALUES (?, ?)",
        Dialect::Postgres => "INSERT INTO schema_migrations (name, applied_at) VALUES ($1, $2)",
    };
    let result = sqlx::query(insert)
        .persistent(false)
        .bind(INITIAL)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(pool)
        .await;
    match result {
        Ok(_) => {}
        // Another process finished the same migration first.
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {}
        Err(e) => return Err(e),
    }

    tracing::info!(migration = INITIAL, "applied schema migration");
    Ok(())
}
