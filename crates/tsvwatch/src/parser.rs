//! Streaming TSV → [`Event`] parser.
//!
//! The first line is a header. Columns map onto event fields by header name
//! through [`field_by_column`]; unknown columns are ignored and absent ones
//! keep their defaults. Quote characters are plain data.

use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tsvwatch_protocol::{field_by_column, Event, EventBatch, FieldError, FieldSpec};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: bad header: {message}")]
    Header { path: PathBuf, message: String },

    #[error("{path}:{line}: {source}")]
    Decode {
        path: PathBuf,
        line: u64,
        #[source]
        source: FieldError,
    },

    #[error("{path}{}: {message}", .line.map(|l| format!(":{}", l)).unwrap_or_default())]
    Read {
        path: PathBuf,
        line: Option<u64>,
        message: String,
    },
}

impl ParseError {
    /// 1-based line of the failure, when known.
    pub fn line(&self) -> Option<u64> {
        match self {
            ParseError::Decode { line, .. } => Some(*line),
            ParseError::Read { line, .. } => *line,
            ParseError::Header { .. } => Some(1),
            ParseError::Open { .. } => None,
        }
    }
}

/// Lazy, single-pass reader of one TSV file.
///
/// The file handle is held until the last record is read, the first error is
/// returned, or the reader is dropped, whichever comes first. After an error
/// the reader yields nothing more.
pub struct EventReader {
    path: PathBuf,
    columns: Vec<Option<&'static FieldSpec>>,
    records: Option<csv::StringRecordsIntoIter<File>>,
}

impl EventReader {
    pub fn open(path: &Path) -> Result<Self, ParseError> {
        let file = File::open(path).map_err(|source| ParseError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .has_headers(true)
            .flexible(false)
            .from_reader(file);

        let headers = reader
            .headers()
            .map_err(|e| ParseError::Header {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
            .clone();
        if headers.is_empty() {
            return Err(ParseError::Header {
                path: path.to_path_buf(),
                message: "file is empty".to_string(),
            });
        }

        let columns = headers
            .iter()
            .map(|name| field_by_column(name.trim().trim_start_matches('\u{feff}')))
            .collect::<Vec<_>>();
        if columns.iter().all(Option::is_none) {
            tracing::warn!(file = %path.display(), "header has no known columns");
        }

        Ok(Self {
            path: path.to_path_buf(),
            columns,
            records: Some(reader.into_records()),
        })
    }

    fn decode(&self, record: &csv::StringRecord) -> Result<Event, ParseError> {
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let mut event = Event::new();
        for (value, column) in record.iter().zip(&self.columns) {
            if let Some(field) = column {
                field
                    .decode_into(&mut event, value)
                    .map_err(|source| ParseError::Decode {
                        path: self.path.clone(),
                        line,
                        source,
                    })?;
            }
        }
        Ok(event)
    }
}

impl Iterator for EventReader {
    type Item = Result<Event, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.records.as_mut()?.next();
        let result = match next {
            None => {
                self.records = None;
                return None;
            }
            Some(Ok(record)) => self.decode(&record),
            Some(Err(e)) => Err(ParseError::Read {
                path: self.path.clone(),
                line: e.position().map(|p| p.line()),
                message: e.to_string(),
            }),
        };
        if result.is_err() {
            // Release the file handle; this parse is over.
            self.records = None;
        }
        Some(result)
    }
}

impl std::iter::FusedIterator for EventReader {}

/// Parse a whole file. Any bad line fails the file.
pub fn parse_file(path: &Path) -> Result<EventBatch, ParseError> {
    let events = EventReader::open(path)?.collect::<Result<Vec<_>, _>>()?;
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(EventBatch::new(source, events))
}
