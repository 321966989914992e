//! Backend selection.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The backend families a store can be opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Sqlite,
    Postgres,
    KvTree,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown storage backend '{0}' (expected sqlite, postgres or kvtree)")]
pub struct UnknownBackend(pub String);

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::Postgres => "postgres",
            BackendKind::KvTree => "kvtree",
        }
    }

    pub fn is_relational(&self) -> bool {
        matches!(self, BackendKind::Sqlite | BackendKind::Postgres)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(BackendKind::Sqlite),
            "postgres" | "postgresql" => Ok(BackendKind::Postgres),
            "kvtree" => Ok(BackendKind::KvTree),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

/// Which backend to open and where.
///
/// `dsn` is a sqlx URL for the relational backends (`sqlite:...`,
/// `postgres://...`) and a journal path for `kvtree` (an optional
/// `kvtree:` prefix is accepted, `:memory:` keeps everything in memory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub backend: BackendKind,
    pub dsn: String,
    pub max_connections: u32,
}

impl StorageConfig {
    pub fn new(backend: BackendKind, dsn: impl Into<String>) -> Self {
        let max_connections = match backend {
            BackendKind::Postgres => 10,
            _ => 5,
        };
        Self {
            backend,
            dsn: dsn.into(),
            max_connections,
        }
    }

    /// File-backed SQLite database at `path`.
    pub fn sqlite(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(
            BackendKind::Sqlite,
            format!("sqlite:{}", path.as_ref().display()),
        )
    }

    /// In-memory SQLite (for testing).
    pub fn sqlite_memory() -> Self {
        Self::new(BackendKind::Sqlite, "sqlite::memory:").with_max_connections(1)
    }

    pub fn kvtree(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(BackendKind::KvTree, path.as_ref().display().to_string())
    }

    pub fn kvtree_memory() -> Self {
        Self::new(BackendKind::KvTree, ":memory:")
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names() {
        assert_eq!("sqlite3".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert_eq!("PostgreSQL".parse::<BackendKind>().unwrap(), BackendKind::Postgres);
        assert_eq!("kvtree".parse::<BackendKind>().unwrap(), BackendKind::KvTree);
        let err = "mongo".parse::<BackendKind>().unwrap_err();
        assert_eq!(err, UnknownBackend("mongo".to_string()));
    }

    #[test]
    fn sqlite_memory_uses_single_connection() {
        let config = StorageConfig::sqlite_memory();
        assert_eq!(config.max_connections, 1);
        assert!(config.backend.is_relational());
    }
}
