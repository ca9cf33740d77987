//! Domain types for chanwatch.
//!
//! - Item: channel references, discovered video items, dedup keys
//! - Outcome: what a check did with each candidate

pub mod item;
pub mod outcome;

pub use item::{watch_url, ChannelRef, MatchKey, VideoItem};
pub use outcome::{CheckOutcome, CheckReport, CheckState};
