//! In-memory store
//!
//! Arena tables indexed by id, guarded by one `RwLock`. Used by tests and by
//! CLI runs without `DATABASE_URL`.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CatalogStore, JobStore, StatusChange, StoreError, StoreResult};
use crate::jobs::{ImportJob, JobStatus, RowOutcome};
use crate::models::{
    CanonicalIngredient, IngredientId, IngredientNutrient, MeasurementType, Nutrient, NutrientId,
    RecipeId, ReferenceCounts,
};
use crate::parser::recipe::ParsedRecipe;

/// Recipe row as stored, with the job that produced it
#[derive(Debug, Clone)]
pub struct StoredRecipe {
    pub id: RecipeId,
    pub process_id: Uuid,
    pub recipe: ParsedRecipe,
}

#[derive(Default)]
struct Tables {
    jobs: HashMap<Uuid, ImportJob>,
    measurement_types: Vec<MeasurementType>,
    nutrients: Vec<Nutrient>,
    ingredients: Vec<CanonicalIngredient>,
    /// normalized name -> first ingredient created with it
    ingredient_index: HashMap<String, IngredientId>,
    ingredient_nutrients: BTreeMap<(IngredientId, NutrientId), IngredientNutrient>,
    recipes: Vec<StoredRecipe>,
}

/// Arena ids are 1-based positions
fn next_id(len: usize) -> i64 {
    len as i64 + 1
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn recipes(&self) -> Vec<StoredRecipe> {
        self.tables.read().await.recipes.clone()
    }

    pub async fn ingredients(&self) -> Vec<CanonicalIngredient> {
        self.tables.read().await.ingredients.clone()
    }

    pub async fn nutrients(&self) -> Vec<Nutrient> {
        self.tables.read().await.nutrients.clone()
    }

    pub async fn all_ingredient_nutrients(&self) -> Vec<IngredientNutrient> {
        self.tables
            .read()
            .await
            .ingredient_nutrients
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: &ImportJob) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.jobs.contains_key(&job.process_id) {
            return Err(StoreError::Constraint(format!(
                "import job {} already exists",
                job.process_id
            )));
        }
        tables.jobs.insert(job.process_id, job.clone());
        Ok(())
    }

    async fn fetch_job(&self, process_id: Uuid) -> StoreResult<Option<ImportJob>> {
        Ok(self.tables.read().await.jobs.get(&process_id).cloned())
    }

    async fn transition(&self, process_id: Uuid, change: &StatusChange) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let Some(job) = tables.jobs.get_mut(&process_id) else {
            return Ok(false);
        };
        if job.status != change.from {
            return Ok(false);
        }

        job.status = change.to;
        if change.started_at.is_some() {
            job.started_at = change.started_at;
        }
        if change.completed_at.is_some() {
            job.completed_at = change.completed_at;
        }
        if change.message.is_some() {
            job.message = change.message.clone();
        }
        Ok(true)
    }

    async fn set_total_records(&self, process_id: Uuid, total: i64) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.jobs.get_mut(&process_id) {
            Some(job) if !job.status.is_terminal() => {
                job.total_records = Some(total);
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn increment_outcome(
        &self,
        process_id: Uuid,
        outcome: RowOutcome,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.jobs.get_mut(&process_id) {
            Some(job) if job.status == JobStatus::Running => {
                match outcome {
                    RowOutcome::Imported => job.imported_count += 1,
                    RowOutcome::Skipped => job.skipped_count += 1,
                    RowOutcome::Error => job.error_count += 1,
                }
                let processed = job.processed();
                if let Some(total) = job.total_records.as_mut() {
                    *total = (*total).max(processed);
                }
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn set_message(&self, process_id: Uuid, message: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.jobs.get_mut(&process_id) {
            Some(job) if !job.status.is_terminal() => {
                job.message = Some(message.to_string());
                Ok(true)
            },
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn find_or_create_measurement_type(
        &self,
        name: &str,
    ) -> StoreResult<(MeasurementType, bool)> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.measurement_types.iter().find(|m| m.name == name) {
            return Ok((existing.clone(), false));
        }
        let created = MeasurementType {
            id: next_id(tables.measurement_types.len()),
            name: name.to_string(),
        };
        tables.measurement_types.push(created.clone());
        Ok((created, true))
    }

    async fn find_or_create_nutrient(
        &self,
        name: &str,
        unit: &str,
    ) -> StoreResult<(Nutrient, bool)> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.nutrients.iter().find(|n| n.name == name) {
            return Ok((existing.clone(), false));
        }
        let created = Nutrient {
            id: next_id(tables.nutrients.len()),
            name: name.to_string(),
            unit: unit.to_string(),
        };
        tables.nutrients.push(created.clone());
        Ok((created, true))
    }

    async fn list_measurement_types(&self) -> StoreResult<Vec<MeasurementType>> {
        Ok(self.tables.read().await.measurement_types.clone())
    }

    async fn count_reference_rows(&self) -> StoreResult<ReferenceCounts> {
        let tables = self.tables.read().await;
        Ok(ReferenceCounts {
            measurement_types: tables.measurement_types.len() as u64,
            nutrients: tables.nutrients.len() as u64,
        })
    }

    async fn find_ingredient(
        &self,
        normalized_name: &str,
    ) -> StoreResult<Option<CanonicalIngredient>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ingredient_index
            .get(normalized_name)
            .and_then(|id| tables.ingredients.get((*id - 1) as usize))
            .cloned())
    }

    async fn create_ingredient(
        &self,
        normalized_name: &str,
        display_name: &str,
    ) -> StoreResult<CanonicalIngredient> {
        let mut tables = self.tables.write().await;
        let created = CanonicalIngredient {
            id: next_id(tables.ingredients.len()),
            name: normalized_name.to_string(),
            display_name: display_name.to_string(),
            created_at: Utc::now(),
        };
        tables
            .ingredient_index
            .entry(created.name.clone())
            .or_insert(created.id);
        tables.ingredients.push(created.clone());
        Ok(created)
    }

    async fn ingredient_nutrients(
        &self,
        ingredient_id: IngredientId,
    ) -> StoreResult<Vec<IngredientNutrient>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ingredient_nutrients
            .range((ingredient_id, NutrientId::MIN)..=(ingredient_id, NutrientId::MAX))
            .map(|(_, association)| association.clone())
            .collect())
    }

    async fn insert_ingredient_nutrient_if_absent(
        &self,
        association: &IngredientNutrient,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let key = (association.ingredient_id, association.nutrient_id);
        if tables.ingredient_nutrients.contains_key(&key) {
            return Ok(false);
        }
        tables.ingredient_nutrients.insert(key, association.clone());
        Ok(true)
    }

    async fn save_ingredient_nutrient(&self, association: &IngredientNutrient) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.ingredient_nutrients.insert(
            (association.ingredient_id, association.nutrient_id),
            association.clone(),
        );
        Ok(())
    }

    async fn insert_recipe(
        &self,
        process_id: Uuid,
        recipe: &ParsedRecipe,
    ) -> StoreResult<RecipeId> {
        let mut tables = self.tables.write().await;

        if !tables.jobs.contains_key(&process_id) {
            return Err(StoreError::Constraint(format!(
                "recipe references unknown import job {}",
                process_id
            )));
        }
        let ingredient_count = tables.ingredients.len() as i64;
        if let Some(line) = recipe
            .ingredients
            .iter()
            .find(|line| line.ingredient_id < 1 || line.ingredient_id > ingredient_count)
        {
            return Err(StoreError::Constraint(format!(
                "recipe ingredient references unknown ingredient {}",
                line.ingredient_id
            )));
        }

        let id = next_id(tables.recipes.len());
        tables.recipes.push(StoredRecipe {
            id,
            process_id,
            recipe: recipe.clone(),
        });
        Ok(id)
    }
}
