//! Durable output of fetched media.
//!
//! Files land in the output directory as `<sanitized title>.<ext>`. Bytes are
//! written to a temp file next to the target and renamed into place, so a
//! failed write never leaves a partial file under the final name.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Stem used when a title sanitizes to nothing
const UNTITLED: &str = "untitled";

/// Longest file name most filesystems accept, in bytes
const MAX_NAME_BYTES: usize = 255;

/// Errors raised while writing an artifact
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{} already exists (pass --overwrite to replace it)", .0.display())]
    AlreadyExists(PathBuf),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SinkError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        SinkError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Writes fetched bytes to uniquely named files under one directory
#[derive(Debug, Clone)]
pub struct Sink {
    /// Output directory (created on first write)
    dir: PathBuf,

    /// File extension without the dot
    extension: String,

    /// Replace an existing file of the same name instead of refusing
    overwrite: bool,
}

impl Sink {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
            overwrite: false,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path for a display name; the stem is cut so the whole name
    /// fits in `MAX_NAME_BYTES`
    pub fn target_path(&self, display_name: &str) -> PathBuf {
        let budget = MAX_NAME_BYTES.saturating_sub(self.extension.len() + 1);
        let stem = truncate_stem(&sanitize_filename(display_name), budget);
        self.dir.join(format!("{}.{}", stem, self.extension))
    }

    /// Write `bytes` under a name derived from `display_name`.
    pub fn store(&self, display_name: &str, bytes: &[u8]) -> Result<PathBuf, SinkError> {
        fs::create_dir_all(&self.dir).map_err(|e| SinkError::io(&self.dir, e))?;

        let target = self.target_path(display_name);
        if !self.overwrite && target.exists() {
            return Err(SinkError::AlreadyExists(target));
        }

        // Dropping the temp file on any error below removes it
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| SinkError::io(&self.dir, e))?;
        tmp.write_all(bytes).map_err(|e| SinkError::io(&target, e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| SinkError::io(&target, e))?;
        set_shared_mode(tmp.as_file()).map_err(|e| SinkError::io(&target, e))?;

        if self.overwrite {
            tmp.persist(&target)
                .map_err(|e| SinkError::io(&target, e.error))?;
        } else {
            tmp.persist_noclobber(&target).map_err(|e| {
                if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                    SinkError::AlreadyExists(target.clone())
                } else {
                    SinkError::io(&target, e.error)
                }
            })?;
        }

        debug!(path = %target.display(), bytes = bytes.len(), "Artifact written");
        Ok(target)
    }
}

/// Derive a single safe path component from a title.
///
/// Path separators, colons and NUL become `_`; the result is trimmed, and an
/// empty, `.` or `..` stem becomes `untitled`.
pub fn sanitize_filename(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            other => other,
        })
        .collect();

    let trimmed = replaced.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        UNTITLED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Cut `stem` to at most `budget` bytes on a char boundary
fn truncate_stem(stem: &str, budget: usize) -> String {
    if stem.len() <= budget {
        return stem.to_string();
    }

    let mut end = budget;
    while !stem.is_char_boundary(end) {
        end -= 1;
    }

    let cut = stem[..end].trim_end();
    if cut.is_empty() {
        UNTITLED.to_string()
    } else {
        cut.to_string()
    }
}

/// Temp files are created 0600; published files get the usual 0644
#[cfg(unix)]
pub(crate) fn set_shared_mode(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
pub(crate) fn set_shared_mode(_file: &File) -> io::Result<()> {
    Ok(())
}
