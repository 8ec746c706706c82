//! In-memory source of named datasets

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::{RawRow, RecipeSource, RowReader, SourceDescriptor, SourceError};

/// Rows registered under a dataset key; the descriptor location is the key
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    datasets: HashMap<String, Arc<Vec<RawRow>>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `rows` under `key`, renumbering them from 1
    pub fn with_dataset(mut self, key: impl Into<String>, rows: Vec<RawRow>) -> Self {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| RawRow {
                record_number: i as u64 + 1,
                ..row
            })
            .collect();
        self.datasets.insert(key.into(), Arc::new(rows));
        self
    }

    fn dataset(&self, descriptor: &SourceDescriptor) -> Result<Arc<Vec<RawRow>>, SourceError> {
        self.datasets
            .get(descriptor.location())
            .cloned()
            .ok_or_else(|| SourceError::Open {
                location: descriptor.location().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "unknown dataset"),
            })
    }
}

#[async_trait]
impl RecipeSource for StaticSource {
    async fn probe(&self, descriptor: &SourceDescriptor) -> Result<(), SourceError> {
        self.dataset(descriptor).map(|_| ())
    }

    async fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn RowReader>, SourceError> {
        let rows = self.dataset(descriptor)?;
        Ok(Box::new(StaticRowReader { rows, next: 0 }))
    }
}

struct StaticRowReader {
    rows: Arc<Vec<RawRow>>,
    next: usize,
}

#[async_trait]
impl RowReader for StaticRowReader {
    fn total_hint(&self) -> Option<u64> {
        Some(self.rows.len() as u64)
    }

    async fn next_row(&mut self) -> Option<Result<RawRow, SourceError>> {
        let row = self.rows.get(self.next)?.clone();
        self.next += 1;
        Some(Ok(row))
    }
}
