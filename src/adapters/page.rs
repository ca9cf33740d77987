//! Probe that scrapes anchor elements from the channel's videos page.
//!
//! The page is assumed to list uploads newest first, so document order is
//! publish order. Anchors are matched by a title substring; the canonical
//! watch URL is the freshness token.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use super::{http_client, ChannelProbe, ProbeError};
use crate::domain::{watch_url, ChannelRef, VideoItem};

/// HTML anchor scraping probe
pub struct PageProbe {
    title_filter: Option<String>,
    client: reqwest::Client,
}

impl PageProbe {
    pub fn new(title_filter: Option<String>, timeout: Option<Duration>) -> Self {
        Self {
            title_filter: title_filter.filter(|f| !f.is_empty()),
            client: http_client(timeout),
        }
    }
}

#[async_trait]
impl ChannelProbe for PageProbe {
    fn name(&self) -> &str {
        "scrape"
    }

    async fn candidates(&self, channel: &ChannelRef) -> Result<Vec<VideoItem>, ProbeError> {
        let url = channel.videos_page_url();
        debug!(%url, "Fetching channel page");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| ProbeError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Upstream {
                status: status.as_u16(),
                message: format!("GET {}", url),
            });
        }

        let body = response.text().await.map_err(|source| ProbeError::Http {
            url: url.clone(),
            source,
        })?;

        extract_items(&body, &url, self.title_filter.as_deref())
    }
}

/// Pull matching video anchors out of a page, in document order
pub fn extract_items(
    html: &str,
    page_url: &str,
    title_filter: Option<&str>,
) -> Result<Vec<VideoItem>, ProbeError> {
    let base = Url::parse(page_url)
        .map_err(|e| ProbeError::Malformed(format!("page URL {}: {}", page_url, e)))?;
    let selector = Selector::parse("a[title][href]")
        .map_err(|e| ProbeError::Malformed(format!("anchor selector: {:?}", e)))?;

    let document = Html::parse_document(html);
    let anchors = document.select(&selector).filter_map(|el| {
        let title = el.value().attr("title")?;
        let href = el.value().attr("href")?;
        Some((title, href))
    });

    Ok(collect_items(anchors, &base, title_filter))
}

/// Shared by the page and browser probes: turn (title, href) pairs into
/// deduplicated items, keeping the first occurrence of each id.
pub(crate) fn collect_items<'a>(
    anchors: impl IntoIterator<Item = (&'a str, &'a str)>,
    base: &Url,
    title_filter: Option<&str>,
) -> Vec<VideoItem> {
    let mut seen_ids = HashSet::new();
    let mut items = Vec::new();

    for (title, href) in anchors {
        let title = title.trim();
        if title.is_empty() {
            continue;
        }
        if let Some(filter) = title_filter {
            if !title.contains(filter) {
                continue;
            }
        }

        let Some(item) = item_from_anchor(title, href, base, title_filter.is_some()) else {
            continue;
        };
        if seen_ids.insert(item.id.clone()) {
            items.push(item);
        }
    }

    items
}

/// Build an item from an anchor. Anchors that do not point at a video are
/// dropped unless they were explicitly selected by a title filter, in which
/// case the id is a hash of the absolute URL.
fn item_from_anchor(title: &str, href: &str, base: &Url, filtered: bool) -> Option<VideoItem> {
    let absolute = base.join(href).ok()?;

    match video_id(&absolute) {
        Some(id) => {
            let token = watch_url(&id);
            Some(VideoItem::new(id, title, token))
        }
        None if filtered => {
            let token = absolute.to_string();
            Some(VideoItem::new(url_hash(&token), title, token))
        }
        None => None,
    }
}

/// `watch?v=<id>` or `/shorts/<id>`
fn video_id(url: &Url) -> Option<String> {
    if let Some((_, v)) = url.query_pairs().find(|(k, v)| k == "v" && !v.is_empty()) {
        return Some(v.into_owned());
    }

    let mut segments = url.path_segments()?;
    while let Some(segment) = segments.next() {
        if segment == "shorts" {
            return segments.next().filter(|s| !s.is_empty()).map(String::from);
        }
    }
    None
}

/// First 16 hex chars of the URL's SHA-256
fn url_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..8])
}
