//! Results of a single check invocation.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::item::VideoItem;

/// Orchestrator states, in the order a successful download passes through them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Idle,
    Probing,
    Comparing,
    Fetching,
    Writing,
    Committing,
    Done,
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckState::Idle => "idle",
            CheckState::Probing => "probing",
            CheckState::Comparing => "comparing",
            CheckState::Fetching => "fetching",
            CheckState::Writing => "writing",
            CheckState::Committing => "committing",
            CheckState::Done => "done",
        };
        f.write_str(name)
    }
}

/// How a candidate item was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The probe found no items at all
    NotFound,

    /// The item is already recorded in the cursor
    AlreadySeen { item: VideoItem },

    /// Fetched, written and committed
    Downloaded { item: VideoItem, path: PathBuf },

    /// Dry run: the item is new but nothing was fetched
    WouldDownload { item: VideoItem },
}

impl CheckOutcome {
    /// Whether this outcome wrote a file and advanced the cursor
    pub fn is_download(&self) -> bool {
        matches!(self, CheckOutcome::Downloaded { .. })
    }

    pub fn item(&self) -> Option<&VideoItem> {
        match self {
            CheckOutcome::NotFound => None,
            CheckOutcome::AlreadySeen { item }
            | CheckOutcome::Downloaded { item, .. }
            | CheckOutcome::WouldDownload { item } => Some(item),
        }
    }
}

/// Summary of one invocation
#[derive(Debug, Clone)]
pub struct CheckReport {
    /// Correlates log lines of one invocation
    pub check_id: Uuid,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    /// One entry per candidate processed (a single entry outside all-matches mode)
    pub outcomes: Vec<CheckOutcome>,
}

impl CheckReport {
    pub fn new(check_id: Uuid, started_at: DateTime<Utc>, outcomes: Vec<CheckOutcome>) -> Self {
        Self {
            check_id,
            started_at,
            completed_at: Utc::now(),
            outcomes,
        }
    }

    /// Number of items downloaded in this invocation
    pub fn downloaded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_download()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts_downloads() {
        let item = VideoItem::new("a", "A", "t1");
        let report = CheckReport::new(
            Uuid::new_v4(),
            Utc::now(),
            vec![
                CheckOutcome::AlreadySeen { item: item.clone() },
                CheckOutcome::Downloaded {
                    item,
                    path: PathBuf::from("videos/A.mp4"),
                },
            ],
        );
        assert_eq!(report.downloaded(), 1);
        assert!(CheckOutcome::NotFound.item().is_none());
    }
}
