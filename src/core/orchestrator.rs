//! Check orchestration: probe, compare against the cursor, fetch, write,
//! commit.
//!
//! The cursor is only ever marked and flushed after the artifact has been
//! written, so every failure path leaves the persisted cursor exactly as it
//! was when the check started.

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{
    ApiProbe, BrowserProbe, ChannelProbe, Fetcher, PageProbe, StreamFetcher, YtDlpFetcher,
};
use crate::config::{FetchBackend, ProbeBackend, ResolvedConfig};
use crate::domain::{ChannelRef, CheckOutcome, CheckReport, CheckState, MatchKey, VideoItem};

use super::cursor::CursorStore;
use super::error::CheckError;
use super::sink::Sink;

/// Main check orchestrator
pub struct Orchestrator {
    probe: Box<dyn ChannelProbe>,
    fetcher: Box<dyn Fetcher>,
    sink: Sink,
    cursor: CursorStore,
    match_keys: Vec<MatchKey>,
    dry_run: bool,
}

impl Orchestrator {
    /// Create an orchestrator from explicit parts
    pub fn new(
        probe: Box<dyn ChannelProbe>,
        fetcher: Box<dyn Fetcher>,
        sink: Sink,
        cursor: CursorStore,
    ) -> Self {
        Self {
            probe,
            fetcher,
            sink,
            cursor,
            match_keys: MatchKey::defaults(),
            dry_run: false,
        }
    }

    /// Build the configured backends, open the sink and lock the cursor.
    ///
    /// Credential checks happen here, before any network or file I/O.
    pub fn from_config(config: &ResolvedConfig) -> Result<Self, CheckError> {
        let probe: Box<dyn ChannelProbe> = match config.probe {
            ProbeBackend::Api => Box::new(ApiProbe::new(
                config.require_api_key()?,
                config.http_timeout,
            )),
            ProbeBackend::Scrape => Box::new(PageProbe::new(
                config.title_filter.clone(),
                config.http_timeout,
            )),
            ProbeBackend::Browser => Box::new(BrowserProbe::new(
                config.webdriver_url.clone(),
                config.title_filter.clone(),
                config.browser_wait,
            )),
        };

        let fetcher: Box<dyn Fetcher> = match config.fetcher {
            FetchBackend::Stream => Box::new(StreamFetcher::new()),
            FetchBackend::Ytdlp => Box::new(
                YtDlpFetcher::new(config.ytdlp_binary.clone(), config.ytdlp_format.clone())
                    .with_timeout(config.fetch_timeout),
            ),
        };

        let sink = Sink::new(config.output_dir.clone(), config.extension.clone())
            .with_overwrite(config.overwrite);
        let cursor = CursorStore::open(config.cursor_path.clone())?;

        Ok(Self::new(probe, fetcher, sink, cursor).with_match_keys(config.match_keys.clone()))
    }

    /// Keys used to decide whether an item was already seen
    pub fn with_match_keys(mut self, match_keys: Vec<MatchKey>) -> Self {
        if !match_keys.is_empty() {
            self.match_keys = match_keys;
        }
        self
    }

    /// Probe and compare only; never fetch, write or commit
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn cursor(&self) -> &CursorStore {
        &self.cursor
    }

    /// Process the single most recent item
    #[instrument(skip(self), fields(check_id = tracing::field::Empty, probe = %self.probe.name(), fetcher = %self.fetcher.name()))]
    pub async fn check(&mut self, channel: &ChannelRef) -> Result<CheckReport, CheckError> {
        let check_id = Uuid::new_v4();
        tracing::Span::current().record("check_id", tracing::field::display(check_id));
        let started_at = Utc::now();

        self.transition(CheckState::Idle, CheckState::Probing);
        let latest = self.probe.latest(channel).await?;

        let outcome = match latest {
            None => {
                self.transition(CheckState::Probing, CheckState::Done);
                info!(%channel, "No videos found");
                CheckOutcome::NotFound
            }
            Some(item) => {
                self.transition(CheckState::Probing, CheckState::Comparing);
                self.process(item).await?
            }
        };

        Ok(CheckReport::new(check_id, started_at, vec![outcome]))
    }

    /// Process every matching item on the page, oldest first.
    ///
    /// Each candidate gets its own fetch/write/commit sequence. A failing
    /// candidate is logged and skipped; the others still run.
    #[instrument(skip(self), fields(check_id = tracing::field::Empty, probe = %self.probe.name(), fetcher = %self.fetcher.name()))]
    pub async fn check_all(&mut self, channel: &ChannelRef) -> Result<CheckReport, CheckError> {
        let check_id = Uuid::new_v4();
        tracing::Span::current().record("check_id", tracing::field::display(check_id));
        let started_at = Utc::now();

        self.transition(CheckState::Idle, CheckState::Probing);
        let mut candidates = self.probe.candidates(channel).await?;

        if candidates.is_empty() {
            self.transition(CheckState::Probing, CheckState::Done);
            info!(%channel, "No videos found");
            return Ok(CheckReport::new(check_id, started_at, vec![CheckOutcome::NotFound]));
        }

        // Newest-first from the probe; commit in publish order
        candidates.reverse();
        let attempted = candidates.len();
        info!(candidates = attempted, "Processing all matches");

        let mut outcomes = Vec::with_capacity(attempted);
        let mut failures: Vec<CheckError> = Vec::new();

        for item in candidates {
            self.transition(CheckState::Probing, CheckState::Comparing);
            match self.process(item).await {
                Ok(outcome) => outcomes.push(outcome),
                // A cursor failure means later commits cannot be trusted either
                Err(e @ CheckError::Cursor(_)) => return Err(e),
                Err(e) => {
                    error!(error = %e, "Candidate failed, continuing");
                    failures.push(e);
                }
            }
        }

        if failures.is_empty() {
            return Ok(CheckReport::new(check_id, started_at, outcomes));
        }

        let failed = failures.len();
        Err(CheckError::Partial {
            failed,
            attempted,
            first: Box::new(failures.remove(0)),
        })
    }

    /// Comparing → (Done | Fetching → Writing → Committing → Done) for one item
    async fn process(&mut self, item: VideoItem) -> Result<CheckOutcome, CheckError> {
        if self.is_seen(&item) {
            self.transition(CheckState::Comparing, CheckState::Done);
            info!(id = %item.id, title = %item.title, "Already downloaded, nothing to do");
            return Ok(CheckOutcome::AlreadySeen { item });
        }

        if self.dry_run {
            self.transition(CheckState::Comparing, CheckState::Done);
            info!(id = %item.id, title = %item.title, "New video (dry run, not fetching)");
            return Ok(CheckOutcome::WouldDownload { item });
        }

        self.transition(CheckState::Comparing, CheckState::Fetching);
        info!(id = %item.id, title = %item.title, "New video, fetching");
        let media = self
            .fetcher
            .fetch(&item)
            .await
            .map_err(|source| CheckError::Fetch {
                id: item.id.clone(),
                source,
            })?;

        self.transition(CheckState::Fetching, CheckState::Writing);
        let path = self
            .sink
            .store(&media.display_name, &media.bytes)
            .map_err(|source| CheckError::Write {
                id: item.id.clone(),
                source,
            })?;

        self.transition(CheckState::Writing, CheckState::Committing);
        self.commit(&item)?;

        self.transition(CheckState::Committing, CheckState::Done);
        info!(path = %path.display(), "Video downloaded successfully");
        Ok(CheckOutcome::Downloaded { item, path })
    }

    /// Seen if any configured key value is already in the cursor
    fn is_seen(&self, item: &VideoItem) -> bool {
        self.match_keys
            .iter()
            .any(|key| self.cursor.seen(item.key(*key)))
    }

    /// Record every configured key value and make it durable
    fn commit(&mut self, item: &VideoItem) -> Result<(), CheckError> {
        for key in &self.match_keys {
            if !self.cursor.mark_seen(item.key(*key)) {
                debug!(%key, "Key value already present in cursor");
            }
        }

        if let Err(e) = self.cursor.flush() {
            warn!(error = %e, "Artifact written but cursor commit failed");
            // Drop the unflushed marks so memory matches disk
            if let Err(reload) = self.cursor.load() {
                warn!(error = %reload, "Cursor reload failed");
            }
            return Err(e.into());
        }

        Ok(())
    }

    fn transition(&self, from: CheckState, to: CheckState) {
        debug!(%from, %to, "State transition");
    }
}
