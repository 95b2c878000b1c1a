//! Append-only ledger of content fingerprints that have been uploaded.
//!
//! One record per line: `<fingerprint> # <annotation>`. Everything from the
//! first `#` is an audit note and is discarded when the ledger is replayed.

use std::{
    collections::HashSet,
    fmt,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use tracing::{debug, info};

use crate::{lock::LockGuard, Result};

pub const LEDGER_FILE: &str = "processed.db";
pub const COMMENT_DELIMITER: char = '#';

/// Content digest used as the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: HashSet<Fingerprint>,
}

impl Ledger {
    /// Replay the store at `path`. A missing store is an empty ledger.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut entries = HashSet::new();

        match fs::read(&path) {
            Ok(bytes) => {
                for line in bytes.split(|b| *b == b'\n') {
                    let Ok(line) = std::str::from_utf8(line) else {
                        continue;
                    };
                    if let Some(key) = parse_line(line) {
                        entries.insert(Fingerprint::new(key));
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to read ledger {}", path.display())));
            }
        }

        debug!(ledger = %path.display(), entries = entries.len(), "ledger loaded");
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a record and mark `fingerprint` as present.
    ///
    /// The guard ties the append to a held [`crate::lock::ExclusiveLock`]:
    /// appends from concurrent processes are only line-safe under that lock.
    pub fn record(
        &mut self,
        _guard: &LockGuard<'_>,
        fingerprint: &Fingerprint,
        annotation: &str,
    ) -> Result<()> {
        let line = format_record(fingerprint, annotation);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open ledger {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.sync_data())
            .with_context(|| format!("failed to append to ledger {}", self.path.display()))?;

        self.entries.insert(fingerprint.clone());
        info!(fingerprint = %fingerprint, annotation, "recorded upload");
        Ok(())
    }
}

/// Extract the key from one ledger line, if any.
pub fn parse_line(line: &str) -> Option<&str> {
    let key = match line.find(COMMENT_DELIMITER) {
        Some(idx) => &line[..idx],
        None => line,
    }
    .trim();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

fn format_record(fingerprint: &Fingerprint, annotation: &str) -> String {
    let annotation: String = annotation
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    let annotation = annotation.trim();
    if annotation.is_empty() {
        format!("{fingerprint}\n")
    } else {
        format!("{fingerprint} {COMMENT_DELIMITER} {annotation}\n")
    }
}
