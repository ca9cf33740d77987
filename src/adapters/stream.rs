//! Embedded streaming client.
//!
//! Resolves an item's stream formats through the innertube `player` endpoint,
//! picks one deterministically and drains the media stream into memory.
//! Only muxed formats with a direct URL are considered; ciphered formats need
//! the external downloader.

use std::cmp::Ordering;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{http_client, FetchError, FetchedMedia, Fetcher};
use crate::domain::VideoItem;

/// Innertube player endpoint
pub const DEFAULT_PLAYER_URL: &str = "https://www.youtube.com/youtubei/v1/player";

const CLIENT_NAME: &str = "ANDROID";
const CLIENT_VERSION: &str = "19.09.37";
const CLIENT_USER_AGENT: &str = "com.google.android.youtube/19.09.37 (Linux; U; Android 11) gzip";

/// Fetcher that talks to the player API directly
pub struct StreamFetcher {
    player_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    playability_status: Option<PlayabilityStatus>,
    video_details: Option<VideoDetails>,
    streaming_data: Option<StreamingData>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoDetails {
    title: String,
}

#[derive(Debug, Deserialize)]
struct StreamingData {
    #[serde(default)]
    formats: Vec<Format>,
}

/// One stream format offered by the player
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Format {
    pub itag: u32,
    pub url: Option<String>,
    pub mime_type: String,
    #[serde(default)]
    pub bitrate: u64,
    pub height: Option<u32>,
    pub content_length: Option<String>,
}

impl Format {
    /// Lower is preferred: avc1 (mp4) first since artifacts are stored as .mp4
    fn codec_rank(&self) -> u8 {
        let mime = self.mime_type.to_ascii_lowercase();
        if mime.contains("avc1") {
            0
        } else if mime.contains("vp9") || mime.contains("vp09") {
            1
        } else if mime.contains("av01") {
            2
        } else {
            3
        }
    }

    fn expected_len(&self) -> Option<u64> {
        self.content_length.as_deref().and_then(|s| s.parse().ok())
    }
}

/// Total order over formats, best first: height desc, codec preference,
/// bitrate desc, itag asc.
pub fn compare_formats(a: &Format, b: &Format) -> Ordering {
    b.height
        .unwrap_or(0)
        .cmp(&a.height.unwrap_or(0))
        .then_with(|| a.codec_rank().cmp(&b.codec_rank()))
        .then_with(|| b.bitrate.cmp(&a.bitrate))
        .then_with(|| a.itag.cmp(&b.itag))
}

/// Best downloadable video format, if any
pub fn select_format(formats: &[Format]) -> Option<&Format> {
    formats
        .iter()
        .filter(|f| f.url.is_some() && f.mime_type.starts_with("video/"))
        .min_by(|a, b| compare_formats(a, b))
}

impl Default for StreamFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFetcher {
    pub fn new() -> Self {
        Self {
            player_url: DEFAULT_PLAYER_URL.to_string(),
            client: http_client(None),
        }
    }

    /// Point the fetcher at a different player endpoint (mock servers)
    pub fn with_player_url(mut self, player_url: impl Into<String>) -> Self {
        self.player_url = player_url.into();
        self
    }

    async fn player(&self, video_id: &str) -> Result<PlayerResponse, FetchError> {
        let body = json!({
            "videoId": video_id,
            "context": {
                "client": {
                    "clientName": CLIENT_NAME,
                    "clientVersion": CLIENT_VERSION,
                    "androidSdkVersion": 30,
                    "hl": "en",
                    "gl": "US",
                }
            },
            "contentCheckOk": true,
            "racyCheckOk": true,
        });

        let response = self
            .client
            .post(&self.player_url)
            .header(reqwest::header::USER_AGENT, CLIENT_USER_AGENT)
            .header("X-YouTube-Client-Name", "3")
            .header("X-YouTube-Client-Version", CLIENT_VERSION)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| FetchError::Http {
                url: self.player_url.clone(),
                source,
            })?;

        response.json().await.map_err(|source| FetchError::Http {
            url: self.player_url.clone(),
            source,
        })
    }

    /// Drain the stream fully; anything short of the advertised length fails
    async fn download(&self, format: &Format, url: &str) -> Result<Vec<u8>, FetchError> {
        let http_error = |source| FetchError::Http {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(http_error)?;

        let expected = response.content_length().or_else(|| format.expected_len());
        let mut buf = Vec::with_capacity(expected.unwrap_or(0).min(64 * 1024 * 1024) as usize);

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(http_error)?;
            buf.extend_from_slice(&chunk);
        }

        if let Some(expected) = expected {
            let received = buf.len() as u64;
            if received < expected {
                return Err(FetchError::Truncated { received, expected });
            }
        }

        Ok(buf)
    }
}

/// Pick the display name and format from a player response
fn resolve(item: &VideoItem, response: PlayerResponse) -> Result<(String, Format), FetchError> {
    if let Some(status) = response.playability_status {
        if status.status != "OK" {
            return Err(FetchError::Unavailable {
                id: item.id.clone(),
                reason: status.reason.unwrap_or(status.status),
            });
        }
    }

    let display_name = response
        .video_details
        .map(|d| d.title)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| item.title.clone());

    let formats = response.streaming_data.map(|s| s.formats).unwrap_or_default();
    let format = select_format(&formats)
        .cloned()
        .ok_or_else(|| FetchError::NoFormat(item.id.clone()))?;

    Ok((display_name, format))
}

#[async_trait]
impl Fetcher for StreamFetcher {
    fn name(&self) -> &str {
        "stream"
    }

    async fn fetch(&self, item: &VideoItem) -> Result<FetchedMedia, FetchError> {
        let response = self.player(&item.id).await?;
        let (display_name, format) = resolve(item, response)?;

        // select_format only returns formats with a URL
        let url = format
            .url
            .clone()
            .ok_or_else(|| FetchError::NoFormat(item.id.clone()))?;

        debug!(itag = format.itag, mime = %format.mime_type, height = ?format.height, "Selected format");
        let bytes = self.download(&format, &url).await?;
        info!(id = %item.id, bytes = bytes.len(), "Stream drained");

        Ok(FetchedMedia::new(display_name, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(itag: u32, mime: &str, height: u32, bitrate: u64) -> Format {
        Format {
            itag,
            url: Some(format!("https://media/{}", itag)),
            mime_type: mime.to_string(),
            bitrate,
            height: Some(height),
            content_length: None,
        }
    }

    #[test]
    fn test_prefers_height_then_codec_then_bitrate() {
        let formats = vec![
            format(18, "video/mp4; codecs=\"avc1.42001E, mp4a.40.2\"", 360, 500_000),
            format(43, "video/webm; codecs=\"vp8.0, vorbis\"", 720, 900_000),
            format(22, "video/mp4; codecs=\"avc1.64001F, mp4a.40.2\"", 720, 800_000),
            format(44, "video/webm; codecs=\"vp9\"", 720, 2_000_000),
        ];

        let best = select_format(&formats).unwrap();
        assert_eq!(best.itag, 22);
    }

    #[test]
    fn test_ordering_is_total() {
        let a = format(10, "video/mp4; codecs=\"avc1\"", 720, 100);
        let b = format(11, "video/mp4; codecs=\"avc1\"", 720, 100);
        assert_eq!(compare_formats(&a, &b), Ordering::Less);
        assert_eq!(compare_formats(&b, &a), Ordering::Greater);
        assert_eq!(compare_formats(&a, &a), Ordering::Equal);
    }

    #[test]
    fn test_skips_ciphered_and_audio_formats() {
        let mut ciphered = format(22, "video/mp4; codecs=\"avc1\"", 1080, 1);
        ciphered.url = None;
        let audio = format(140, "audio/mp4; codecs=\"mp4a.40.2\"", 0, 128_000);
        let usable = format(18, "video/mp4; codecs=\"avc1\"", 360, 1);

        let formats = [ciphered, audio, usable];
        assert_eq!(select_format(&formats).unwrap().itag, 18);
        assert!(select_format(&formats[..2]).is_none());
    }

    #[test]
    fn test_resolve_unplayable() {
        let item = VideoItem::new("abc123", "Episode 1", "t");
        let response: PlayerResponse = serde_json::from_str(
            r#"{"playabilityStatus": {"status": "LOGIN_REQUIRED", "reason": "Sign in to confirm your age"}}"#,
        )
        .unwrap();

        match resolve(&item, response) {
            Err(FetchError::Unavailable { id, reason }) => {
                assert_eq!(id, "abc123");
                assert_eq!(reason, "Sign in to confirm your age");
            }
            other => panic!("unexpected: {:?}", other.map(|(n, _)| n)),
        }
    }

    #[test]
    fn test_resolve_picks_title_and_format() {
        let item = VideoItem::new("abc123", "Probe title", "t");
        let response: PlayerResponse = serde_json::from_str(
            r#"{
              "playabilityStatus": {"status": "OK"},
              "videoDetails": {"videoId": "abc123", "title": "Player title"},
              "streamingData": {"formats": [
                {"itag": 18, "url": "https://media/18", "mimeType": "video/mp4; codecs=\"avc1.42001E, mp4a.40.2\"",
                 "bitrate": 500000, "height": 360, "contentLength": "1234"}
              ]}
            }"#,
        )
        .unwrap();

        let (name, format) = resolve(&item, response).unwrap();
        assert_eq!(name, "Player title");
        assert_eq!(format.itag, 18);
        assert_eq!(format.expected_len(), Some(1234));
    }

    /// Serve one canned HTTP response on a local port, then close
    async fn serve_once(response: &'static [u8]) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket.write_all(response).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{}/media", addr)
    }

    #[tokio::test]
    async fn test_short_body_against_format_length_is_truncated() {
        let url = serve_once(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nDATA").await;
        let mut media = format(18, "video/mp4; codecs=\"avc1\"", 360, 1);
        media.content_length = Some("100".to_string());

        match StreamFetcher::new().download(&media, &url).await {
            Err(FetchError::Truncated { received, expected }) => {
                assert_eq!(received, 4);
                assert_eq!(expected, 100);
            }
            other => panic!("unexpected: {:?}", other.map(|b| b.len())),
        }
    }

    #[tokio::test]
    async fn test_short_body_against_content_length_fails() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\nDATA",
        )
        .await;
        let media = format(18, "video/mp4; codecs=\"avc1\"", 360, 1);

        let result = StreamFetcher::new().download(&media, &url).await;
        assert!(matches!(
            result,
            Err(FetchError::Truncated { .. }) | Err(FetchError::Http { .. })
        ));
    }

    #[tokio::test]
    async fn test_complete_body_is_returned() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\nDATA",
        )
        .await;
        let mut media = format(18, "video/mp4; codecs=\"avc1\"", 360, 1);
        media.content_length = Some("4".to_string());

        let bytes = StreamFetcher::new().download(&media, &url).await.unwrap();
        assert_eq!(bytes, b"DATA");
    }

    #[test]
    fn test_resolve_without_formats() {
        let item = VideoItem::new("abc123", "Episode 1", "t");
        let response: PlayerResponse =
            serde_json::from_str(r#"{"playabilityStatus": {"status": "OK"}}"#).unwrap();

        assert!(matches!(resolve(&item, response), Err(FetchError::NoFormat(_))));
    }
}
