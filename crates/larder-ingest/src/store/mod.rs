//! Persistence traits and their Postgres and in-memory implementations
//!
//! The pipeline talks to storage only through [`JobStore`] and
//! [`CatalogStore`]. Each call commits on its own; a recipe and all of its
//! child rows are written by a single [`CatalogStore::insert_recipe`] call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::jobs::{ImportJob, JobStatus, RowOutcome};
use crate::models::{
    CanonicalIngredient, IngredientId, IngredientNutrient, MeasurementType, Nutrient, RecipeId,
    ReferenceCounts,
};
use crate::parser::recipe::ParsedRecipe;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Connectivity failures end the whole job; anything else only fails
    /// the row being written.
    pub fn is_fatal(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// Conditional status update applied by [`JobStore::transition`]
#[derive(Debug, Clone)]
pub struct StatusChange {
    /// Status the job must currently have
    pub from: JobStatus,
    pub to: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

/// Persisted import jobs
///
/// Updates are conditional on the stored status and report whether a row
/// was changed, so a stale writer can never move a job backwards.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: &ImportJob) -> StoreResult<()>;

    async fn fetch_job(&self, process_id: Uuid) -> StoreResult<Option<ImportJob>>;

    /// Apply `change` only if the job is still in `change.from`
    async fn transition(&self, process_id: Uuid, change: &StatusChange) -> StoreResult<bool>;

    /// Only applies to non-terminal jobs
    async fn set_total_records(&self, process_id: Uuid, total: i64) -> StoreResult<bool>;

    /// Increment one counter; only applies to Running jobs.
    ///
    /// A known `total_records` is raised in the same update when the new
    /// processed count would pass it.
    async fn increment_outcome(&self, process_id: Uuid, outcome: RowOutcome)
        -> StoreResult<bool>;

    /// Only applies to non-terminal jobs
    async fn set_message(&self, process_id: Uuid, message: &str) -> StoreResult<bool>;
}

/// Recipes, canonical ingredients and reference data
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Returns the row and whether it was created by this call
    async fn find_or_create_measurement_type(
        &self,
        name: &str,
    ) -> StoreResult<(MeasurementType, bool)>;

    /// Returns the row and whether it was created by this call
    async fn find_or_create_nutrient(&self, name: &str, unit: &str)
        -> StoreResult<(Nutrient, bool)>;

    async fn list_measurement_types(&self) -> StoreResult<Vec<MeasurementType>>;

    async fn count_reference_rows(&self) -> StoreResult<ReferenceCounts>;

    /// Lookup by normalized name; the oldest row wins when duplicates exist
    async fn find_ingredient(&self, normalized_name: &str)
        -> StoreResult<Option<CanonicalIngredient>>;

    async fn create_ingredient(
        &self,
        normalized_name: &str,
        display_name: &str,
    ) -> StoreResult<CanonicalIngredient>;

    async fn ingredient_nutrients(
        &self,
        ingredient_id: IngredientId,
    ) -> StoreResult<Vec<IngredientNutrient>>;

    /// Returns false when the (ingredient, nutrient) pair already exists
    async fn insert_ingredient_nutrient_if_absent(
        &self,
        association: &IngredientNutrient,
    ) -> StoreResult<bool>;

    /// Insert or overwrite the (ingredient, nutrient) pair
    async fn save_ingredient_nutrient(&self, association: &IngredientNutrient)
        -> StoreResult<()>;

    /// Persist a recipe with its steps and ingredient lines atomically
    async fn insert_recipe(&self, process_id: Uuid, recipe: &ParsedRecipe)
        -> StoreResult<RecipeId>;
}
