//! NDJSON write-ahead journal. One JSON object per line; the tree is
//! rebuilt by replaying every line on open.

use crate::namespace::Namespace;
use crate::KvError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum JournalEntry {
    Set {
        path: Vec<String>,
        key: String,
        value: String,
    },
    Append {
        path: Vec<String>,
        index: u64,
        values: BTreeMap<String, String>,
    },
}

impl JournalEntry {
    pub(crate) fn apply(self, root: &mut Namespace) {
        match self {
            JournalEntry::Set { path, key, value } => {
                root.lookup_or_create(&path).insert_value(key, value);
            }
            JournalEntry::Append {
                path,
                index,
                values,
            } => {
                root.lookup_or_create(&path)
                    .insert_child(index.to_string(), Namespace::from_values(values));
            }
        }
    }
}

/// Where journal lines land. `File` in production.
pub(crate) trait JournalFile: Write {
    fn sync(&self) -> io::Result<()>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl JournalFile for File {
    fn sync(&self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

pub(crate) struct Journal<F: JournalFile = File> {
    file: F,
    /// Length of the file up to the last fully written line.
    len: u64,
}

pub(crate) struct Replayed {
    pub journal: Journal,
    pub root: Namespace,
    pub entries: u64,
}

impl Journal {
    /// Open (or create) the journal at `path` and replay it.
    ///
    /// A torn final line, left by a write that never completed, is cut off.
    /// Any other unreadable line is reported as corruption.
    pub(crate) fn open(path: &Path) -> Result<Replayed, KvError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut root = Namespace::default();
        let mut entries = 0u64;
        let mut good_len = 0usize;
        let mut torn = false;

        for (idx, chunk) in bytes.split_inclusive(|b| *b == b'\n').enumerate() {
            let line_no = idx + 1;
            if chunk.last() != Some(&b'\n') {
                tracing::warn!(
                    journal = %path.display(),
                    line = line_no,
                    "discarding incomplete journal line"
                );
                torn = true;
                break;
            }

            let text = std::str::from_utf8(chunk).map_err(|e| KvError::Corrupt {
                line: line_no,
                message: e.to_string(),
            })?;
            let text = text.trim();
            if !text.is_empty() {
                let entry: JournalEntry =
                    serde_json::from_str(text).map_err(|e| KvError::Corrupt {
                        line: line_no,
                        message: e.to_string(),
                    })?;
                entry.apply(&mut root);
                entries += 1;
            }
            good_len += chunk.len();
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if torn {
            file.set_len(good_len as u64)?;
        }

        Ok(Replayed {
            journal: Journal::new(file, good_len as u64),
            root,
            entries,
        })
    }
}

impl<F: JournalFile> Journal<F> {
    fn new(file: F, len: u64) -> Self {
        Self { file, len }
    }

    /// Append one entry and make it durable before returning.
    ///
    /// On failure the file is cut back to its last good length so a partial
    /// line cannot surface in front of the next entry.
    pub(crate) fn append(&mut self, entry: &JournalEntry) -> Result<(), KvError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let written = self
            .file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.sync());
        if let Err(e) = written {
            if let Err(rollback) = self.file.truncate(self.len) {
                tracing::warn!(error = %rollback, len = self.len, "journal rollback failed");
            }
            return Err(e.into());
        }
        self.len += line.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_tagged_by_op() {
        let entry = JournalEntry::Set {
            path: vec!["files".into()],
            key: "a.tsv".into(),
            value: String::new(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.starts_with(r#"{"op":"set""#), "{}", json);
    }

    /// In-memory file that refuses writes once `room` bytes are used up.
    #[derive(Default)]
    struct TightFile {
        bytes: Vec<u8>,
        room: usize,
    }

    impl Write for TightFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let free = self.room.saturating_sub(self.bytes.len());
            if free == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "no space left"));
            }
            let n = free.min(buf.len());
            self.bytes.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl JournalFile for TightFile {
        fn sync(&self) -> io::Result<()> {
            Ok(())
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.bytes.truncate(len as usize);
            Ok(())
        }
    }

    fn set(key: &str) -> JournalEntry {
        JournalEntry::Set {
            path: vec!["files".into()],
            key: key.into(),
            value: String::new(),
        }
    }

    #[test]
    fn failed_append_leaves_no_partial_line() {
        let first = serde_json::to_string(&set("a.tsv")).unwrap().len() + 1;
        let mut journal = Journal::new(
            TightFile {
                bytes: Vec::new(),
                room: first + 5,
            },
            0,
        );

        journal.append(&set("a.tsv")).unwrap();
        assert!(matches!(journal.append(&set("b.tsv")), Err(KvError::Io(_))));
        assert_eq!(journal.file.bytes.len(), first);
        assert_eq!(journal.len, first as u64);

        journal.file.room = usize::MAX;
        journal.append(&set("c.tsv")).unwrap();
        let text = String::from_utf8(journal.file.bytes.clone()).unwrap();
        let keys: Vec<String> = text
            .lines()
            .map(|line| match serde_json::from_str(line).unwrap() {
                JournalEntry::Set { key, .. } => key,
                other => panic!("unexpected entry {:?}", other),
            })
            .collect();
        assert_eq!(keys, vec!["a.tsv", "c.tsv"]);
    }

    #[test]
    fn append_tracks_file_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.ndjson");
        let mut replayed = Journal::open(&path).unwrap();
        replayed.journal.append(&set("a.tsv")).unwrap();
        replayed.journal.append(&set("b.tsv")).unwrap();
        assert_eq!(replayed.journal.len, fs::metadata(&path).unwrap().len());

        let reopened = Journal::open(&path).unwrap();
        assert_eq!(reopened.entries, 2);
        assert_eq!(reopened.journal.len, replayed.journal.len);
    }

    #[test]
    fn append_creates_numbered_child() {
        let mut root = Namespace::default();
        let mut values = BTreeMap::new();
        values.insert("number".to_string(), "1".to_string());
        JournalEntry::Append {
            path: vec!["devices".into(), "G".into()],
            index: 1,
            values,
        }
        .apply(&mut root);

        let device = root.lookup(&["devices", "G"]).unwrap();
        assert_eq!(device.child_count(), 1);
        assert_eq!(device.child("1").unwrap().value("number"), Some("1"));
    }
}
