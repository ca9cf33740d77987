//! Error taxonomy for a check, and the exit code each kind maps to.

use thiserror::Error;

use super::cursor::CursorError;
use super::sink::SinkError;
use crate::adapters::{FetchError, ProbeError};
use crate::config::ConfigError;

/// Everything that can make a check fail.
///
/// "Nothing new" is not an error; it is a `CheckOutcome`.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("fetch failed for {id}: {source}")]
    Fetch {
        id: String,
        #[source]
        source: FetchError,
    },

    #[error("write failed for {id}: {source}")]
    Write {
        id: String,
        #[source]
        source: SinkError,
    },

    #[error("cursor error: {0}")]
    Cursor(#[from] CursorError),

    #[error("{failed} of {attempted} candidates failed; first: {first}")]
    Partial {
        failed: usize,
        attempted: usize,
        first: Box<CheckError>,
    },
}

impl CheckError {
    /// Process exit code for this error kind
    pub fn exit_code(&self) -> i32 {
        match self {
            CheckError::Config(_) => 2,
            CheckError::Probe(_) => 3,
            CheckError::Fetch { .. } => 4,
            CheckError::Write { .. } => 5,
            CheckError::Cursor(_) => 6,
            CheckError::Partial { first, .. } => first.exit_code(),
        }
    }
}
