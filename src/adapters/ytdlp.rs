//! Fetcher that delegates to an external downloader (yt-dlp or youtube-dl).
//!
//! Spawns `<bin> -f <format> <url> -o <tmp>/%(title)s.%(ext)s` in a fresh
//! temp directory and reads back the single file it produced. The temp
//! directory is removed on every path, so a failed download leaves nothing.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{FetchError, FetchedMedia, Fetcher};
use crate::domain::VideoItem;

/// Output template handed to the downloader
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Characters of stderr kept in error messages
const STDERR_TAIL: usize = 500;

/// External downloader process
pub struct YtDlpFetcher {
    /// Path to the downloader binary (default: "yt-dlp")
    binary_path: String,

    /// Value passed to `-f`
    format: String,

    /// Kill the process if it runs longer than this
    timeout: Option<Duration>,
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new("yt-dlp", "mp4")
    }
}

impl YtDlpFetcher {
    pub fn new(binary_path: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            format: format.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments for one item, output rooted at `dir`
    fn args(&self, item: &VideoItem, dir: &Path) -> Vec<String> {
        vec![
            "-f".to_string(),
            self.format.clone(),
            item.watch_url(),
            "-o".to_string(),
            dir.join(OUTPUT_TEMPLATE).to_string_lossy().into_owned(),
        ]
    }

    async fn run(&self, args: &[String]) -> Result<(), FetchError> {
        let child = Command::new(&self.binary_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| FetchError::ProcessTimeout {
                    program: self.binary_path.clone(),
                    timeout: limit,
                })??,
            None => child.wait_with_output().await?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Process {
                program: self.binary_path.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr: tail(stderr.trim(), STDERR_TAIL),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    fn name(&self) -> &str {
        "ytdlp"
    }

    async fn fetch(&self, item: &VideoItem) -> Result<FetchedMedia, FetchError> {
        let staging = tempfile::tempdir()?;
        let args = self.args(item, staging.path());

        debug!(program = %self.binary_path, ?args, "Spawning downloader");
        self.run(&args).await?;

        let file = single_output(staging.path())?;
        let bytes = tokio::fs::read(&file).await?;
        let display_name = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| item.title.clone());

        info!(id = %item.id, bytes = bytes.len(), "Downloader finished");
        Ok(FetchedMedia::new(display_name, bytes))
    }
}

/// The one completed file in the staging directory, ignoring leftovers such
/// as `.part` or `.ytdl` fragments
fn single_output(dir: &Path) -> Result<PathBuf, FetchError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let partial = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("part") | Some("ytdl") | Some("temp")
        );
        if path.is_file() && !partial {
            files.push(path);
        }
    }

    match files.len() {
        1 => Ok(files.remove(0)),
        n => Err(FetchError::UnexpectedOutput(n)),
    }
}

fn tail(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    s.chars().skip(count.saturating_sub(max_chars)).collect()
}
