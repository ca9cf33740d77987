//! chanwatch - download a channel's newest video exactly once
//!
//! Each invocation checks one channel: it probes for the latest upload,
//! compares it against a small persisted cursor, and only if the item is new
//! fetches the media, writes it to disk and commits the cursor.
//!
//! # Architecture
//!
//! - Probes and fetchers are swappable capabilities selected by configuration
//! - The cursor is an append-only set of seen identities on disk
//! - The cursor is committed only after the artifact is fully written, so a
//!   failed run never advances it
//!
//! # Modules
//!
//! - `adapters`: Upstream integrations (Data API, page scrape, WebDriver,
//!   embedded stream client, yt-dlp)
//! - `core`: Cursor store, sink, orchestrator, error taxonomy
//! - `domain`: Data structures (ChannelRef, VideoItem, CheckOutcome)
//! - `config`: Layered configuration
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Check a channel once (meant to be run by cron or a systemd timer)
//! YOUTUBE_API_KEY=... chanwatch check --channel UCxxxxxxxx
//!
//! # Scrape the page for every upload whose title matches
//! chanwatch check --probe scrape --fetcher ytdlp --filter "Bruce Falconer" --all
//!
//! # Show what has been downloaded so far
//! chanwatch history
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{ChannelProbe, FetchError, FetchedMedia, Fetcher, ProbeError};
pub use core::{CheckError, CursorStore, Orchestrator, Sink};
pub use domain::{ChannelRef, CheckOutcome, CheckReport, MatchKey, VideoItem};
