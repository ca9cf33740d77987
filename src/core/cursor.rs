//! Persistent set of already-processed item identities.
//!
//! The on-disk schema is plain UTF-8 text, one identity per line, in the order
//! the identities were committed. A missing file is an empty store. Older JSON
//! array files (`["url", ...]`) are accepted on load and rewritten in the line
//! format on the next flush.
//!
//! While a `CursorStore` is alive it holds an exclusive lock on a sidecar
//! `<cursor>.lock` file, so overlapping invocations cannot lose each other's
//! updates.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use super::sink::set_shared_mode;

/// Errors raised while loading, locking or committing the cursor
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("cursor {} is locked by another invocation", .0.display())]
    Locked(PathBuf),

    #[error("cursor I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CursorError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        CursorError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Append-only ordered set of seen identities
pub struct CursorStore {
    /// Path to the cursor file
    path: PathBuf,

    /// Identities in commit order
    entries: Vec<String>,

    /// Membership index over `entries`
    index: HashSet<String>,

    /// Entries marked since the last flush
    pending: usize,

    /// Held for the lifetime of the store; released on drop
    _lock: File,
}

impl CursorStore {
    /// Lock and load the cursor at `path`.
    ///
    /// Fails fast with `CursorError::Locked` if another process holds it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CursorError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CursorError::io(parent, e))?;
        }

        let lock_path = lock_path(&path);
        let lock = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| CursorError::io(&lock_path, e))?;

        if lock.try_lock_exclusive().is_err() {
            return Err(CursorError::Locked(path));
        }

        let mut store = Self {
            path,
            entries: Vec::new(),
            index: HashSet::new(),
            pending: 0,
            _lock: lock,
        };
        store.load()?;
        Ok(store)
    }

    /// Read the persisted identities without taking the lock (for display)
    pub fn snapshot(path: &Path) -> Result<Vec<String>, CursorError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(parse_entries(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(CursorError::io(path, e)),
        }
    }

    /// Re-read persisted state, discarding anything not yet flushed
    pub fn load(&mut self) -> Result<(), CursorError> {
        self.entries.clear();
        self.index.clear();
        self.pending = 0;

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No cursor file yet, starting empty");
                return Ok(());
            }
            Err(e) => return Err(CursorError::io(&self.path, e)),
        };

        for entry in parse_entries(&content) {
            if self.index.insert(entry.clone()) {
                self.entries.push(entry);
            }
        }

        debug!(path = %self.path.display(), entries = self.entries.len(), "Loaded cursor");
        Ok(())
    }

    /// Whether `identity` was committed by a previous run (or marked in this one)
    pub fn seen(&self, identity: &str) -> bool {
        self.index.contains(identity)
    }

    /// Record `identity` in memory. Returns false if it was already present.
    ///
    /// Nothing is durable until `flush`.
    pub fn mark_seen(&mut self, identity: &str) -> bool {
        if identity.is_empty() || identity.contains(['\n', '\r']) {
            warn!(identity, "Identity cannot be stored in the cursor, skipping");
            return false;
        }
        if !self.index.insert(identity.to_string()) {
            return false;
        }
        self.entries.push(identity.to_string());
        self.pending += 1;
        true
    }

    /// Durably write the store: temp file in the same directory, then an
    /// atomic rename over the cursor. No-op when nothing is pending.
    pub fn flush(&mut self) -> Result<(), CursorError> {
        if self.pending == 0 {
            return Ok(());
        }

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| CursorError::io(&dir, e))?;
        for entry in &self.entries {
            writeln!(tmp, "{}", entry).map_err(|e| CursorError::io(tmp.path(), e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| CursorError::io(&self.path, e))?;
        set_shared_mode(tmp.as_file()).map_err(|e| CursorError::io(&self.path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| CursorError::io(&self.path, e.error))?;

        debug!(path = %self.path.display(), flushed = self.pending, "Cursor committed");
        self.pending = 0;
        Ok(())
    }

    /// Identities in commit order
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether there are marked identities that have not been flushed
    pub fn is_dirty(&self) -> bool {
        self.pending > 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Sidecar lock path: `<cursor>.lock`
fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Parse a legacy JSON array of strings, falling back to the line format
fn parse_entries(content: &str) -> Vec<String> {
    let trimmed = content.trim();
    if trimmed.starts_with('[') {
        if let Ok(entries) = serde_json::from_str::<Vec<String>>(trimmed) {
            return entries;
        }
    }

    content
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(String::from)
        .collect()
}
