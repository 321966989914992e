//! Per-store statement cache.
//!
//! All SQL the relational store runs is rendered once per dialect when the
//! store opens, then prepared against the pool so a typo or dialect mismatch
//! fails at startup instead of on the first file. Queries reference their
//! statement by [`StatementName`] and run with `persistent(true)`, which keeps
//! the prepared form in each connection's statement cache.

use sqlx::{AnyPool, Executor};
use tsvwatch_protocol::EVENT_FIELDS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Placeholder for the `n`-th (1-based) bind parameter.
    fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${}", n),
        }
    }

    fn placeholders(&self, count: usize) -> String {
        (1..=count)
            .map(|n| self.placeholder(n))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementName {
    InsertFilename,
    SelectFilenames,
    SelectFilenameError,
    InsertEvent,
    SelectEventByOrdinal,
    CountDeviceEvents,
}

impl StatementName {
    pub const ALL: [StatementName; 6] = [
        StatementName::InsertFilename,
        StatementName::SelectFilenames,
        StatementName::SelectFilenameError,
        StatementName::InsertEvent,
        StatementName::SelectEventByOrdinal,
        StatementName::CountDeviceEvents,
    ];

    /// Position in [`StatementName::ALL`].
    const fn index(self) -> usize {
        match self {
            StatementName::InsertFilename => 0,
            StatementName::SelectFilenames => 1,
            StatementName::SelectFilenameError => 2,
            StatementName::InsertEvent => 3,
            StatementName::SelectEventByOrdinal => 4,
            StatementName::CountDeviceEvents => 5,
        }
    }
}

/// Column list of the `events` table: identity first, then the field table.
pub(crate) fn event_columns() -> Vec<&'static str> {
    std::iter::once("id")
        .chain(EVENT_FIELDS.iter().map(|f| f.key))
        .collect()
}

/// Quoted column list; `bit` and friends are keywords in PostgreSQL.
fn quoted_event_columns() -> String {
    event_columns()
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render(dialect: Dialect, name: StatementName) -> String {
    let p = |n| dialect.placeholder(n);
    match name {
        StatementName::InsertFilename => format!(
            "INSERT INTO ingested_files (name, error, recorded_at) VALUES ({})",
            dialect.placeholders(3)
        ),
        StatementName::SelectFilenames => {
            "SELECT name FROM ingested_files ORDER BY seq".to_string()
        }
        StatementName::SelectFilenameError => format!(
            "SELECT error FROM ingested_files WHERE name = {}",
            p(1)
        ),
        StatementName::InsertEvent => {
            format!(
                "INSERT INTO events ({}) VALUES ({})",
                quoted_event_columns(),
                dialect.placeholders(event_columns().len())
            )
        }
        StatementName::SelectEventByOrdinal => format!(
            "SELECT {} FROM events WHERE unit_guid = {} ORDER BY seq LIMIT 1 OFFSET {}",
            quoted_event_columns(),
            p(1),
            p(2)
        ),
        StatementName::CountDeviceEvents => format!(
            "SELECT COUNT(*) AS total FROM events WHERE unit_guid = {}",
            p(1)
        ),
    }
}

/// Rendered SQL for every statement of one store.
#[derive(Debug, Clone)]
pub struct StatementCache {
    sql: [String; 6],
}

impl StatementCache {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            sql: StatementName::ALL.map(|name| render(dialect, name)),
        }
    }

    pub fn get(&self, name: StatementName) -> &str {
        &self.sql[name.index()]
    }

    /// Prepare every statement once against `pool`.
    pub async fn prepare_all(&self, pool: &AnyPool) -> Result<(), sqlx::Error> {
        let mut conn = pool.acquire().await?;
        for name in StatementName::ALL {
            let sql = self.get(name);
            (&mut *conn).prepare(sql).await?;
            tracing::trace!(statement = ?name, "prepared");
        }
        Ok(())
    }
}
