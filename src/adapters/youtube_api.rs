//! Probe backed by the YouTube Data API v3 `search.list` endpoint.
//!
//! Asks for the channel's videos ordered by date with a result cap of one; the
//! publish timestamp is the freshness token.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::{http_client, ChannelProbe, ProbeError};
use crate::domain::{ChannelRef, VideoItem};

/// Default Data API root
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Data API search probe
pub struct ApiProbe {
    api_key: String,
    base_url: String,
    max_results: u32,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: ResourceId,
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    published_at: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl ApiProbe {
    pub fn new(api_key: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
            max_results: 1,
            client: http_client(timeout),
        }
    }

    /// Point the probe at a different API root (mock servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Number of results to request (the single-latest check needs one)
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results.max(1);
        self
    }
}

#[async_trait]
impl ChannelProbe for ApiProbe {
    fn name(&self) -> &str {
        "api"
    }

    async fn candidates(&self, channel: &ChannelRef) -> Result<Vec<VideoItem>, ProbeError> {
        let channel_id = channel_id(channel)?;
        let url = format!("{}/search", self.base_url);
        let max_results = self.max_results.to_string();

        debug!(%channel_id, "Querying search.list");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("part", "id,snippet"),
                ("channelId", channel_id.as_str()),
                ("order", "date"),
                ("type", "video"),
                ("maxResults", max_results.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|source| ProbeError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| ProbeError::Http {
            url: url.clone(),
            source,
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| body.chars().take(200).collect());
            return Err(ProbeError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SearchListResponse = serde_json::from_str(&body)
            .map_err(|e| ProbeError::Malformed(format!("search.list body: {}", e)))?;

        Ok(items_from_response(parsed))
    }
}

/// Accept a bare channel id or a `/channel/<id>` URL
fn channel_id(channel: &ChannelRef) -> Result<String, ProbeError> {
    if !channel.is_url() {
        return Ok(channel.as_str().to_string());
    }

    let parsed = url::Url::parse(channel.as_str())
        .map_err(|e| ProbeError::Malformed(format!("channel URL {}: {}", channel, e)))?;
    let mut segments = parsed.path_segments().into_iter().flatten();
    while let Some(segment) = segments.next() {
        if segment == "channel" {
            if let Some(id) = segments.next().filter(|s| !s.is_empty()) {
                return Ok(id.to_string());
            }
        }
    }

    Err(ProbeError::Malformed(format!(
        "the API probe needs a channel id, got {}",
        channel
    )))
}

/// Convert search results to items, newest first, dropping non-video hits
fn items_from_response(response: SearchListResponse) -> Vec<VideoItem> {
    let mut dated: Vec<(Option<DateTime<Utc>>, VideoItem)> = response
        .items
        .into_iter()
        .filter_map(|result| {
            let id = result.id.video_id?;
            let snippet = result.snippet?;
            let published = DateTime::parse_from_rfc3339(&snippet.published_at)
                .ok()
                .map(|d| d.with_timezone(&Utc));
            Some((
                published,
                VideoItem::new(id, unescape_html(&snippet.title), snippet.published_at),
            ))
        })
        .collect();

    // Stable sort: unparseable timestamps keep their server order, after dated ones
    dated.sort_by(|a, b| b.0.cmp(&a.0));
    dated.into_iter().map(|(_, item)| item).collect()
}

/// Snippet titles arrive HTML-escaped
fn unescape_html(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Vec<VideoItem> {
        items_from_response(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_parses_latest_item() {
        let items = parse(
            r#"{
              "kind": "youtube#searchListResponse",
              "items": [{
                "kind": "youtube#searchResult",
                "id": {"kind": "youtube#video", "videoId": "abc123"},
                "snippet": {"publishedAt": "2024-01-01T00:00:00Z", "title": "Episode 1"}
              }]
            }"#,
        );

        assert_eq!(
            items,
            vec![VideoItem::new("abc123", "Episode 1", "2024-01-01T00:00:00Z")]
        );
    }

    #[test]
    fn test_empty_response_is_empty() {
        assert!(parse(r#"{"items": []}"#).is_empty());
        assert!(parse(r#"{}"#).is_empty());
    }

    #[test]
    fn test_skips_non_video_results() {
        let items = parse(
            r#"{"items": [
              {"id": {"kind": "youtube#channel", "channelId": "UC1"},
               "snippet": {"publishedAt": "2024-02-01T00:00:00Z", "title": "Channel"}},
              {"id": {"kind": "youtube#video", "videoId": "v1"},
               "snippet": {"publishedAt": "2024-01-01T00:00:00Z", "title": "Video"}}
            ]}"#,
        );

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "v1");
    }

    #[test]
    fn test_orders_by_publish_date_descending() {
        let items = parse(
            r#"{"items": [
              {"id": {"videoId": "old"}, "snippet": {"publishedAt": "2023-05-01T00:00:00Z", "title": "Old"}},
              {"id": {"videoId": "new"}, "snippet": {"publishedAt": "2024-05-01T00:00:00+02:00", "title": "New"}}
            ]}"#,
        );

        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        // Token is kept verbatim, not normalised
        assert_eq!(items[0].freshness_token, "2024-05-01T00:00:00+02:00");
    }

    #[test]
    fn test_unescapes_titles() {
        assert_eq!(unescape_html("Q&amp;A: &quot;Live&quot; &#39;24"), "Q&A: \"Live\" '24");
    }

    #[test]
    fn test_channel_id_from_url() {
        let id = channel_id(&ChannelRef::new("https://www.youtube.com/channel/UCabc/videos")).unwrap();
        assert_eq!(id, "UCabc");
        assert_eq!(channel_id(&ChannelRef::new("UCxyz")).unwrap(), "UCxyz");
        assert!(channel_id(&ChannelRef::new("https://www.youtube.com/@handle")).is_err());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let probe = ApiProbe::new("KEY", None).with_base_url("http://localhost:8080/v3/");
        assert_eq!(probe.base_url, "http://localhost:8080/v3");
        assert_eq!(probe.name(), "api");
    }
}
