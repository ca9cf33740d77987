//! Capability interfaces for the upstream platform.
//!
//! A `ChannelProbe` discovers candidate items without fetching media; a
//! `Fetcher` retrieves the media bytes for one item. Each has interchangeable
//! backends selected by configuration:
//!
//! - probes: `ApiProbe` (Data API search), `PageProbe` (HTML anchors),
//!   `BrowserProbe` (WebDriver-rendered page)
//! - fetchers: `StreamFetcher` (embedded player client), `YtDlpFetcher`
//!   (external downloader process)

pub mod browser;
pub mod page;
pub mod stream;
pub mod youtube_api;
pub mod ytdlp;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ChannelRef, VideoItem};

pub use browser::BrowserProbe;
pub use page::PageProbe;
pub use stream::StreamFetcher;
pub use youtube_api::ApiProbe;
pub use ytdlp::YtDlpFetcher;

/// Failures while discovering items
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Malformed(String),

    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),

    #[error("browser session failed: {0}")]
    Browser(String),
}

/// Failures while retrieving media
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("video {id} is not playable: {reason}")]
    Unavailable { id: String, reason: String },

    #[error("no downloadable format for video {0}")]
    NoFormat(String),

    #[error("stream ended after {received} of {expected} bytes")]
    Truncated { received: u64, expected: u64 },

    #[error("downloader {program} exited with {code}: {stderr}")]
    Process {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("downloader {program} timed out after {timeout:?}")]
    ProcessTimeout { program: String, timeout: Duration },

    #[error("downloader produced {0} files, expected exactly one")]
    UnexpectedOutput(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Media bytes for one item plus the name to store them under
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub display_name: String,
    pub bytes: Vec<u8>,
}

impl FetchedMedia {
    pub fn new(display_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            display_name: display_name.into(),
            bytes,
        }
    }
}

/// Discovers the items a channel has published
#[async_trait]
pub trait ChannelProbe: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Candidate items, most recently published first. Empty means nothing found.
    async fn candidates(&self, channel: &ChannelRef) -> Result<Vec<VideoItem>, ProbeError>;

    /// The single most recent item, or `None` when the channel has nothing
    async fn latest(&self, channel: &ChannelRef) -> Result<Option<VideoItem>, ProbeError> {
        Ok(self.candidates(channel).await?.into_iter().next())
    }
}

/// Retrieves media bytes for an item
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Fetch the complete media payload. A partial read is an error.
    async fn fetch(&self, item: &VideoItem) -> Result<FetchedMedia, FetchError>;
}

/// Shared HTTP client for the reqwest-based backends
pub(crate) fn http_client(timeout: Option<Duration>) -> reqwest::Client {
    let mut builder = reqwest::Client::builder().user_agent(concat!(
        "chanwatch/",
        env!("CARGO_PKG_VERSION")
    ));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    // Builder only fails on TLS backend initialisation; fall back to defaults
    builder.build().unwrap_or_else(|_| reqwest::Client::new())
}
