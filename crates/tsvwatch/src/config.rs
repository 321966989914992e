//! Configuration for the watch pipeline.
//!
//! Read from a TOML file, then overridden by CLI flags.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tsvwatch_db::{BackendKind, StorageConfig, UnknownBackend};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error(transparent)]
    UnknownBackend(#[from] UnknownBackend),

    #[error("No watch directory configured (set `directory` or pass --dir)")]
    MissingDirectory,

    #[error("refresh_secs must be greater than zero")]
    ZeroInterval,

    #[error("queue_capacity must be greater than zero")]
    ZeroCapacity,

    #[error("Backend {0} needs a dsn")]
    MissingDsn(BackendKind),
}

/// Main configuration for `tsvwatch watch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Directory polled for `*.tsv` files
    #[serde(default)]
    pub directory: String,

    /// Poll interval in seconds
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,

    /// Capacity of the watcher → pipeline queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default)]
    pub storage: StorageSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSection {
    /// sqlite, postgres or kvtree
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Connection URL or journal path; defaults under the tsvwatch home
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsn: Option<String>,
}

fn default_refresh_secs() -> u64 {
    5
}

fn default_queue_capacity() -> usize {
    100
}

fn default_backend() -> String {
    BackendKind::Sqlite.to_string()
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            dsn: None,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            directory: String::new(),
            refresh_secs: default_refresh_secs(),
            queue_capacity: default_queue_capacity(),
            storage: StorageSection::default(),
        }
    }
}

impl WatchConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check everything that can be checked without touching the filesystem
    /// or the database.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.trim().is_empty() {
            return Err(ConfigError::MissingDirectory);
        }
        if self.refresh_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        self.storage.resolve()?;
        Ok(())
    }

    pub fn directory(&self) -> PathBuf {
        PathBuf::from(&self.directory)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }
}

impl StorageSection {
    /// Backend and DSN, with the per-backend default DSN filled in.
    pub fn resolve(&self) -> Result<StorageConfig, ConfigError> {
        let backend: BackendKind = self.backend.parse()?;
        let dsn = match (&self.dsn, backend) {
            (Some(dsn), _) if !dsn.trim().is_empty() => dsn.clone(),
            (_, BackendKind::Sqlite) => format!(
                "sqlite:{}",
                tsvwatch_logging::tsvwatch_home()
                    .join("tsvwatch.sqlite3")
                    .display()
            ),
            (_, BackendKind::KvTree) => tsvwatch_logging::tsvwatch_home()
                .join("tsvwatch.kv")
                .display()
                .to_string(),
            (_, BackendKind::Postgres) => return Err(ConfigError::MissingDsn(backend)),
        };
        Ok(StorageConfig::new(backend, dsn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_fill_missing_keys() {
        let config: WatchConfig = toml::from_str(r#"directory = "/data/in""#).unwrap();
        assert_eq!(config.refresh_secs, 5);
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.storage.backend, "sqlite");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn full_file_parses() {
        let config: WatchConfig = toml::from_str(
            r#"
directory = "./incoming"
refresh_secs = 2
queue_capacity = 8

[storage]
backend = "kvtree"
dsn = "/var/lib/tsvwatch/events.kv"
"#,
        )
        .unwrap();
        let storage = config.storage.resolve().unwrap();
        assert_eq!(storage.backend, BackendKind::KvTree);
        assert_eq!(storage.dsn, "/var/lib/tsvwatch/events.kv");
        assert_eq!(config.refresh_interval(), Duration::from_secs(2));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let mut config = WatchConfig {
            directory: "in".into(),
            ..WatchConfig::default()
        };
        config.storage.backend = "cassandra".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownBackend(_))
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let base = WatchConfig {
            directory: "in".into(),
            ..WatchConfig::default()
        };
        assert!(matches!(
            WatchConfig { directory: " ".into(), ..base.clone() }.validate(),
            Err(ConfigError::MissingDirectory)
        ));
        assert!(matches!(
            WatchConfig { refresh_secs: 0, ..base.clone() }.validate(),
            Err(ConfigError::ZeroInterval)
        ));
        assert!(matches!(
            WatchConfig { queue_capacity: 0, ..base.clone() }.validate(),
            Err(ConfigError::ZeroCapacity)
        ));

        let mut postgres = base;
        postgres.storage.backend = "postgresql".into();
        assert!(matches!(
            postgres.validate(),
            Err(ConfigError::MissingDsn(BackendKind::Postgres))
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tsvwatch.toml");
        let config = WatchConfig {
            directory: "/data/in".into(),
            refresh_secs: 9,
            queue_capacity: 3,
            storage: StorageSection {
                backend: "sqlite".into(),
                dsn: Some("sqlite:/tmp/x.sqlite3".into()),
            },
        };
        config.save(&path).unwrap();
        assert_eq!(WatchConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn bad_toml_names_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "refresh_secs = \"soon\"").unwrap();
        let err = WatchConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }
}
