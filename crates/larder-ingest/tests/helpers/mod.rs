//! Shared fixtures for larder-ingest integration tests

#![allow(dead_code, clippy::unwrap_used)]

use async_trait::async_trait;
use larder_ingest::jobs::ImportStatusResponse;
use larder_ingest::models::{
    CanonicalIngredient, IngredientId, IngredientNutrient, MeasurementType, Nutrient, RecipeId,
    ReferenceCounts,
};
use larder_ingest::orchestrator::{IngestionOrchestrator, OrchestratorSettings};
use larder_ingest::parser::ParsedRecipe;
use larder_ingest::source::{RawRow, RecipeSource, RowReader, SourceDescriptor, SourceError};
use larder_ingest::store::{CatalogStore, MemoryStore, StoreError, StoreResult};
use larder_ingest::nutrients::FoodLookup;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

static TRACING: Once = Once::new();

/// Route pipeline logs through the test harness (`--nocapture` to see them)
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("larder_ingest=debug")
            .with_test_writer()
            .try_init();
    });
}

pub fn recipe_row(title: &str, ingredients: &str, instructions: &str) -> RawRow {
    RawRow {
        title: Some(title.to_string()),
        ingredients: Some(ingredients.to_string()),
        instructions: Some(instructions.to_string()),
        ..Default::default()
    }
}

pub fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        max_concurrent_jobs: 2,
        progress_interval: 3,
        lookup_timeout: Duration::from_millis(200),
        search_limit: 3,
    }
}

pub fn orchestrator(
    store: Arc<MemoryStore>,
    source: Arc<dyn RecipeSource>,
    lookup: Option<Arc<dyn FoodLookup>>,
) -> IngestionOrchestrator {
    IngestionOrchestrator::new(store.clone(), store, source, lookup, settings())
}

/// Poll until the job reaches a terminal status
pub async fn wait_for_terminal(
    orchestrator: &IngestionOrchestrator,
    process_id: Uuid,
) -> ImportStatusResponse {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let status = orchestrator.get_import_status(process_id).await.unwrap();
            if status.status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap()
}

/// Poll until `predicate` holds for the job snapshot
pub async fn wait_until<F>(orchestrator: &IngestionOrchestrator, process_id: Uuid, predicate: F)
where
    F: Fn(&ImportStatusResponse) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let status = orchestrator.get_import_status(process_id).await.unwrap();
            if predicate(&status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap()
}

// ============================================================================
// Channel-fed source
// ============================================================================

/// Source whose rows are pushed by the test; the reader waits for more rows
/// until the sender is dropped.
pub struct ChannelSource {
    receiver: Mutex<Option<mpsc::UnboundedReceiver<RawRow>>>,
}

impl ChannelSource {
    pub fn new() -> (Self, mpsc::UnboundedSender<RawRow>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                receiver: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait]
impl RecipeSource for ChannelSource {
    async fn probe(&self, _descriptor: &SourceDescriptor) -> Result<(), SourceError> {
        Ok(())
    }

    async fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn RowReader>, SourceError> {
        let receiver = self.receiver.lock().await.take().ok_or_else(|| SourceError::Open {
            location: descriptor.location().to_string(),
            source: std::io::Error::other("channel already consumed"),
        })?;
        Ok(Box::new(ChannelReader { receiver, next: 0 }))
    }
}

struct ChannelReader {
    receiver: mpsc::UnboundedReceiver<RawRow>,
    next: u64,
}

#[async_trait]
impl RowReader for ChannelReader {
    async fn next_row(&mut self) -> Option<Result<RawRow, SourceError>> {
        let row = self.receiver.recv().await?;
        self.next += 1;
        Some(Ok(RawRow {
            record_number: self.next,
            ..row
        }))
    }
}

// ============================================================================
// Catalog that loses its connection
// ============================================================================

/// Delegates to a [`MemoryStore`] until `healthy_inserts` recipes have been
/// written, then reports every recipe insert as a lost connection.
pub struct FlakyCatalog {
    inner: Arc<MemoryStore>,
    healthy_inserts: usize,
    inserts: AtomicUsize,
}

impl FlakyCatalog {
    pub fn new(inner: Arc<MemoryStore>, healthy_inserts: usize) -> Self {
        Self {
            inner,
            healthy_inserts,
            inserts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CatalogStore for FlakyCatalog {
    async fn find_or_create_measurement_type(
        &self,
        name: &str,
    ) -> StoreResult<(MeasurementType, bool)> {
        self.inner.find_or_create_measurement_type(name).await
    }

    async fn find_or_create_nutrient(
        &self,
        name: &str,
        unit: &str,
    ) -> StoreResult<(Nutrient, bool)> {
        self.inner.find_or_create_nutrient(name, unit).await
    }

    async fn list_measurement_types(&self) -> StoreResult<Vec<MeasurementType>> {
        self.inner.list_measurement_types().await
    }

    async fn count_reference_rows(&self) -> StoreResult<ReferenceCounts> {
        self.inner.count_reference_rows().await
    }

    async fn find_ingredient(
        &self,
        normalized_name: &str,
    ) -> StoreResult<Option<CanonicalIngredient>> {
        self.inner.find_ingredient(normalized_name).await
    }

    async fn create_ingredient(
        &self,
        normalized_name: &str,
        display_name: &str,
    ) -> StoreResult<CanonicalIngredient> {
        self.inner
            .create_ingredient(normalized_name, display_name)
            .await
    }

    async fn ingredient_nutrients(
        &self,
        ingredient_id: IngredientId,
    ) -> StoreResult<Vec<IngredientNutrient>> {
        self.inner.ingredient_nutrients(ingredient_id).await
    }

    async fn insert_ingredient_nutrient_if_absent(
        &self,
        association: &IngredientNutrient,
    ) -> StoreResult<bool> {
        self.inner
            .insert_ingredient_nutrient_if_absent(association)
            .await
    }

    async fn save_ingredient_nutrient(&self, association: &IngredientNutrient) -> StoreResult<()> {
        self.inner.save_ingredient_nutrient(association).await
    }

    async fn insert_recipe(&self, process_id: Uuid, recipe: &ParsedRecipe) -> StoreResult<RecipeId> {
        if self.inserts.fetch_add(1, Ordering::SeqCst) >= self.healthy_inserts {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.insert_recipe(process_id, recipe).await
    }
}
