//! Recipe sources
//!
//! A source turns a descriptor into a lazy, finite, non-restartable
//! sequence of [`RawRow`]s.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod csv;
pub mod memory;

pub use self::csv::CsvFileSource;
pub use self::memory::StaticSource;

/// Where the rows come from (a file path, or a dataset key)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    location: String,
}

impl SourceDescriptor {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

impl std::fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.location)
    }
}

/// One unparsed source record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based position in the source
    pub record_number: u64,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Raw ingredient block, list-shaped when well formed
    pub ingredients: Option<String>,
    pub instructions: Option<String>,
    pub cook_time: Option<String>,
    pub servings: Option<String>,
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Cannot open source '{location}': {source}")]
    Open {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unrecognized source layout: {0}")]
    Schema(String),

    #[error("Record {record} could not be read: {message}")]
    Record { record: u64, message: String },

    #[error("Source read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// A bad record only fails that row; every other variant ends the job
    pub fn is_row_level(&self) -> bool {
        matches!(self, SourceError::Record { .. })
    }
}

/// Factory for row readers
#[async_trait]
pub trait RecipeSource: Send + Sync {
    /// Cheap check that `descriptor` can be opened at all
    async fn probe(&self, descriptor: &SourceDescriptor) -> Result<(), SourceError>;

    async fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn RowReader>, SourceError>;
}

/// Lazy row sequence
#[async_trait]
pub trait RowReader: Send {
    /// Total row count when it could be derived cheaply
    fn total_hint(&self) -> Option<u64> {
        None
    }

    /// `None` once the source is exhausted
    async fn next_row(&mut self) -> Option<Result<RawRow, SourceError>>;
}
