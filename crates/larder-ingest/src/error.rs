//! Ingest error types

use thiserror::Error;

use crate::jobs::{runner::RunnerError, tracker::TrackerError};
use crate::source::SourceError;
use crate::store::StoreError;

/// Result type alias for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors that escape an ingestion operation
///
/// Row-level problems never surface here; they are classified into job
/// counters by the orchestrator.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("Job runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}
