//! In-memory probe and fetcher doubles shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chanwatch::{
    ChannelProbe, ChannelRef, CursorStore, FetchError, FetchedMedia, Fetcher, Orchestrator,
    ProbeError, Sink, VideoItem,
};
use tempfile::TempDir;

/// Probe returning a fixed candidate list, newest first
#[derive(Clone, Default)]
pub struct StaticProbe {
    items: Arc<Mutex<Vec<VideoItem>>>,
    fail: bool,
    pub calls: Arc<AtomicUsize>,
}

impl StaticProbe {
    pub fn with_items(items: Vec<VideoItem>) -> Self {
        Self {
            items: Arc::new(Mutex::new(items)),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn set_items(&self, items: Vec<VideoItem>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelProbe for StaticProbe {
    fn name(&self) -> &str {
        "static"
    }

    async fn candidates(&self, _channel: &ChannelRef) -> Result<Vec<VideoItem>, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProbeError::Upstream {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }
        Ok(self.items.lock().unwrap().clone())
    }
}

/// Fetcher returning fixed bytes, optionally failing for chosen ids
#[derive(Clone, Default)]
pub struct StaticFetcher {
    bytes: Vec<u8>,
    fail_ids: Vec<String>,
    pub calls: Arc<AtomicUsize>,
}

impl StaticFetcher {
    pub fn with_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            ..Default::default()
        }
    }

    pub fn failing_for(mut self, id: &str) -> Self {
        self.fail_ids.push(id.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self, item: &VideoItem) -> Result<FetchedMedia, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_ids.iter().any(|id| id == &item.id) {
            return Err(FetchError::Truncated {
                received: 2,
                expected: 4,
            });
        }
        Ok(FetchedMedia::new(item.title.clone(), self.bytes.clone()))
    }
}

/// Temp workspace with an output dir and a cursor path
pub struct Workspace {
    pub temp: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.temp.path().join("videos")
    }

    pub fn cursor_path(&self) -> PathBuf {
        self.temp.path().join("seen.txt")
    }

    /// Build an orchestrator over the doubles; the cursor lock is taken here
    pub fn orchestrator(&self, probe: &StaticProbe, fetcher: &StaticFetcher) -> Orchestrator {
        Orchestrator::new(
            Box::new(probe.clone()),
            Box::new(fetcher.clone()),
            Sink::new(self.output_dir(), "mp4"),
            CursorStore::open(self.cursor_path()).unwrap(),
        )
    }

    /// Raw cursor bytes, or None if the file does not exist
    pub fn cursor_bytes(&self) -> Option<Vec<u8>> {
        std::fs::read(self.cursor_path()).ok()
    }

    pub fn output_files(&self) -> Vec<String> {
        list_files(&self.output_dir())
    }
}

pub fn list_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

pub fn channel() -> ChannelRef {
    ChannelRef::new("UCtestchannel")
}

pub fn episode_1() -> VideoItem {
    VideoItem::new("abc123", "Episode 1", "2024-01-01T00:00:00Z")
}
