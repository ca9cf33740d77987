//! Probe that renders the channel page in a headless browser over WebDriver.
//!
//! The videos page fills in client-side, so the probe waits (bounded) for the
//! first matching anchor before reading attributes. Needs a running WebDriver
//! server such as chromedriver.

use std::time::Duration;

use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use super::page::collect_items;
use super::{ChannelProbe, ProbeError};
use crate::domain::{ChannelRef, VideoItem};

/// Anchor used for upload titles when no filter is configured
const VIDEO_TITLE_SELECTOR: &str = "a#video-title-link";

/// WebDriver-driven probe
pub struct BrowserProbe {
    webdriver_url: String,
    title_filter: Option<String>,
    wait: Duration,
    headless: bool,
}

impl BrowserProbe {
    pub fn new(webdriver_url: impl Into<String>, title_filter: Option<String>, wait: Duration) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            title_filter: title_filter.filter(|f| !f.is_empty()),
            wait,
            headless: true,
        }
    }

    /// Show the browser window (debugging)
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// CSS selector for the anchors of interest
    fn selector(&self) -> String {
        match &self.title_filter {
            Some(filter) => format!("a[title*=\"{}\"]", css_escape(filter)),
            None => VIDEO_TITLE_SELECTOR.to_string(),
        }
    }

    async fn connect(&self) -> Result<Client, ProbeError> {
        let mut args = vec!["--disable-gpu", "--no-sandbox", "--window-size=1280,2000"];
        if self.headless {
            args.push("--headless=new");
        }

        let mut caps = serde_json::Map::new();
        caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        caps.insert(
            "moz:firefoxOptions".to_string(),
            json!({ "args": if self.headless { vec!["-headless"] } else { vec![] } }),
        );

        ClientBuilder::native()
            .capabilities(caps)
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| ProbeError::Browser(format!("connect {}: {}", self.webdriver_url, e)))
    }

    async fn read_anchors(
        &self,
        client: &Client,
        page_url: &str,
    ) -> Result<Vec<(String, String)>, ProbeError> {
        client.goto(page_url).await.map_err(browser_error)?;

        let selector = self.selector();
        debug!(%selector, wait = ?self.wait, "Waiting for rendered anchors");

        match client
            .wait()
            .at_most(self.wait)
            .for_element(Locator::Css(&selector))
            .await
        {
            Ok(_) => {}
            Err(CmdError::WaitTimeout) => return Err(ProbeError::Timeout(self.wait, selector)),
            Err(e) => return Err(browser_error(e)),
        }

        let elements = client
            .find_all(Locator::Css(&selector))
            .await
            .map_err(browser_error)?;

        let mut anchors = Vec::with_capacity(elements.len());
        for element in elements {
            let href = element.attr("href").await.map_err(browser_error)?;
            let title = match title_attr(element.attr("title").await.map_err(browser_error)?) {
                Some(title) => title,
                None => element.text().await.map_err(browser_error)?,
            };
            if let Some(href) = href {
                anchors.push((title, href));
            }
        }

        Ok(anchors)
    }
}

#[async_trait]
impl ChannelProbe for BrowserProbe {
    fn name(&self) -> &str {
        "browser"
    }

    async fn candidates(&self, channel: &ChannelRef) -> Result<Vec<VideoItem>, ProbeError> {
        let page_url = channel.videos_page_url();
        let base = Url::parse(&page_url)
            .map_err(|e| ProbeError::Malformed(format!("page URL {}: {}", page_url, e)))?;

        let client = self.connect().await?;
        let result = self.read_anchors(&client, &page_url).await;

        // Always end the session, even when reading failed
        if let Err(e) = client.close().await {
            warn!(error = %e, "Failed to close WebDriver session");
        }

        let anchors = result?;
        Ok(collect_items(
            anchors.iter().map(|(t, h)| (t.as_str(), h.as_str())),
            &base,
            self.title_filter.as_deref(),
        ))
    }
}

fn browser_error(e: CmdError) -> ProbeError {
    ProbeError::Browser(e.to_string())
}

/// A blank `title` attribute counts as missing so the anchor text is used
fn title_attr(title: Option<String>) -> Option<String> {
    title.filter(|t| !t.trim().is_empty())
}

/// Escape a value for use inside a double-quoted CSS attribute selector
fn css_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_selector() {
        let probe = BrowserProbe::new("http://localhost:4444", None, Duration::from_secs(10));
        assert_eq!(probe.selector(), "a#video-title-link");
    }

    #[test]
    fn test_filter_selector_is_escaped() {
        let probe = BrowserProbe::new(
            "http://localhost:4444",
            Some("Say \"hi\"".to_string()),
            Duration::from_secs(10),
        );
        assert_eq!(probe.selector(), r#"a[title*="Say \"hi\""]"#);
    }

    #[test]
    fn test_empty_filter_is_ignored() {
        let probe = BrowserProbe::new("http://localhost:4444", Some(String::new()), Duration::from_secs(1));
        assert!(probe.title_filter.is_none());
        assert_eq!(probe.name(), "browser");
    }

    #[test]
    fn test_blank_title_attribute_falls_back() {
        assert_eq!(title_attr(Some(String::new())), None);
        assert_eq!(title_attr(Some("  ".to_string())), None);
        assert_eq!(title_attr(None), None);
        assert_eq!(
            title_attr(Some("Episode 1".to_string())).as_deref(),
            Some("Episode 1")
        );
    }

    #[tokio::test]
    async fn test_unreachable_webdriver_is_probe_error() {
        let probe = BrowserProbe::new("http://127.0.0.1:9", None, Duration::from_millis(100));
        let result = probe.candidates(&ChannelRef::new("UC123")).await;
        assert!(matches!(result, Err(ProbeError::Browser(_))));
    }
}
