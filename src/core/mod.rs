//! Core change-detection logic.
//!
//! This module contains:
//! - CursorStore: persisted set of seen identities
//! - Sink: atomic artifact writes
//! - Orchestrator: probe → compare → fetch → write → commit
//! - CheckError: error taxonomy and exit codes

pub mod cursor;
pub mod error;
pub mod orchestrator;
pub mod sink;

// Re-export commonly used types
pub use cursor::{CursorError, CursorStore};
pub use error::CheckError;
pub use orchestrator::Orchestrator;
pub use sink::{sanitize_filename, Sink, SinkError};
