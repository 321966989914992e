//! Logging setup for the tsvwatch binary.
//!
//! Log lines go to a size-rotated file under `<home>/logs` and to stderr.
//! `RUST_LOG` overrides the default filter for both.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "tsvwatch=info,tsvwatch_db=info,tsvwatch_kvtree=info";

/// How many log files to keep and how large each may grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_files: usize,
    pub max_size: u64,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_files: 5,
            max_size: 10 * 1024 * 1024,
        }
    }
}

pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Send the full file filter to stderr as well.
    pub verbose: bool,
    /// Only warnings and errors on stderr.
    pub quiet: bool,
    /// Overrides `<home>/logs`.
    pub log_dir: Option<PathBuf>,
}

impl<'a> LogConfig<'a> {
    pub fn new(app_name: &'a str) -> Self {
        Self {
            app_name,
            verbose: false,
            quiet: false,
            log_dir: None,
        }
    }
}

/// Install the global subscriber: rotating file writer plus stderr.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = match config.log_dir {
        Some(dir) => dir,
        None => logs_dir(),
    };
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create logs directory: {}", log_dir.display()))?;
    let file_writer = SharedRollingWriter::new(&log_dir, config.app_name, RotationPolicy::default())
        .context("Failed to initialize rolling log writer")?;

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.verbose {
        file_filter.clone()
    } else if config.quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tsvwatch=info,warn"))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// The tsvwatch home directory.
///
/// Priority:
/// 1) TSVWATCH_HOME
/// 2) the user's home directory, `~/.tsvwatch`
/// 3) ./.tsvwatch
pub fn tsvwatch_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("TSVWATCH_HOME") {
        return PathBuf::from(override_path);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".tsvwatch"),
        None => PathBuf::from(".").join(".tsvwatch"),
    }
}

/// `<home>/logs`
pub fn logs_dir() -> PathBuf {
    tsvwatch_home().join("logs")
}

struct RollingFileAppender {
    dir: PathBuf,
    base_name: String,
    policy: RotationPolicy,
    file: Option<File>,
    current_size: u64,
}

impl RollingFileAppender {
    fn new(dir: &Path, base_name: &str, policy: RotationPolicy) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let mut appender = Self {
            dir: dir.to_path_buf(),
            base_name: sanitize_name(base_name),
            policy: RotationPolicy {
                max_files: policy.max_files.max(1),
                ..policy
            },
            file: None,
            current_size: 0,
        };
        appender.reopen()?;
        if appender.current_size > appender.policy.max_size {
            appender.rotate()?;
        }
        Ok(appender)
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.base_name))
    }

    fn rotated_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.base_name, index))
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_path())?;
        self.current_size = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    /// Shift `name.log.N` to `N+1`, dropping the oldest, then start a fresh file.
    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        let max_index = self.policy.max_files.saturating_sub(1);
        if max_index == 0 {
            fs::remove_file(self.current_path()).or_else(ignore_missing)?;
            return self.reopen();
        }

        fs::remove_file(self.rotated_path(max_index)).or_else(ignore_missing)?;
        for idx in (1..max_index).rev() {
            fs::rename(self.rotated_path(idx), self.rotated_path(idx + 1)).or_else(ignore_missing)?;
        }
        fs::rename(self.current_path(), self.rotated_path(1)).or_else(ignore_missing)?;

        self.reopen()
    }
}

fn ignore_missing(err: io::Error) -> io::Result<()> {
    if err.kind() == io::ErrorKind::NotFound {
        Ok(())
    } else {
        Err(err)
    }
}

impl Write for RollingFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current_size > 0 && self.current_size + buf.len() as u64 > self.policy.max_size {
            self.rotate()?;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let bytes = file.write(buf)?;
        self.current_size += bytes as u64;
        Ok(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
struct SharedRollingWriter {
    inner: Arc<Mutex<RollingFileAppender>>,
}

impl SharedRollingWriter {
    fn new(dir: &Path, base_name: &str, policy: RotationPolicy) -> Result<Self> {
        let appender = RollingFileAppender::new(dir, base_name, policy)
            .with_context(|| format!("Failed to open log file for {}", base_name))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(appender)),
        })
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedRollingWriter {
    type Writer = SharedRollingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for SharedRollingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?
            .flush()
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rotation_keeps_at_most_max_files() {
        let dir = tempdir().unwrap();
        let policy = RotationPolicy {
            max_files: 3,
            max_size: 16,
        };
        let mut appender = RollingFileAppender::new(dir.path(), "tsvwatch", policy).unwrap();
        for i in 0..10 {
            appender.write_all(format!("line number {:02}\n", i).as_bytes()).unwrap();
        }
        appender.flush().unwrap();

        assert!(dir.path().join("tsvwatch.log").exists());
        assert!(dir.path().join("tsvwatch.log.1").exists());
        assert!(dir.path().join("tsvwatch.log.2").exists());
        assert!(!dir.path().join("tsvwatch.log.3").exists());

        let newest = fs::read_to_string(dir.path().join("tsvwatch.log")).unwrap();
        assert_eq!(newest, "line number 09\n");
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize_name("tsv watch/1"), "tsv_watch_1");
    }
}
