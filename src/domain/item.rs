//! Channel references and the video items a probe discovers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier or URL naming the source channel.
///
/// Supplied once per invocation and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef(String);

impl ChannelRef {
    /// Create a channel reference, trimming surrounding whitespace
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the reference is already a full URL rather than a bare id
    pub fn is_url(&self) -> bool {
        self.0.starts_with("http://") || self.0.starts_with("https://")
    }

    /// The channel's videos page, used by the page-based probes
    pub fn videos_page_url(&self) -> String {
        if self.is_url() {
            self.0.clone()
        } else {
            format!("https://www.youtube.com/channel/{}/videos", self.0)
        }
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single upload discovered by a probe.
///
/// Created by a `ChannelProbe` and read-only for the rest of the invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoItem {
    /// Platform-stable identifier (e.g. an 11-character video id)
    pub id: String,

    /// Human-readable title, also the output filename stem
    pub title: String,

    /// Publish timestamp (API probe) or canonical item URL (page probes).
    /// Not comparable across backends.
    pub freshness_token: String,
}

impl VideoItem {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        freshness_token: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            freshness_token: freshness_token.into(),
        }
    }

    /// Canonical watch URL for this item
    pub fn watch_url(&self) -> String {
        watch_url(&self.id)
    }

    /// Value of the given dedup key for this item
    pub fn key(&self, key: MatchKey) -> &str {
        match key {
            MatchKey::Id => &self.id,
            MatchKey::FreshnessToken => &self.freshness_token,
            MatchKey::Title => &self.title,
        }
    }
}

/// Canonical watch URL for a video id
pub fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

/// Which item fields are used to decide whether an item was already seen.
///
/// An item is seen if ANY configured key value is present in the cursor, and a
/// commit records ALL configured key values. Matching is exact string equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKey {
    /// Immutable platform id (robust default)
    Id,

    /// Publish timestamp or canonical URL
    FreshnessToken,

    /// Mutable title; fallback only, must be opted into
    Title,
}

impl MatchKey {
    /// The default key set: id plus freshness token
    pub fn defaults() -> Vec<MatchKey> {
        vec![MatchKey::Id, MatchKey::FreshnessToken]
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchKey::Id => "id",
            MatchKey::FreshnessToken => "freshness_token",
            MatchKey::Title => "title",
        };
        f.write_str(name)
    }
}
