//! Postgres store backed by the schema in `migrations/`

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::error::ErrorKind;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{CatalogStore, JobStore, StatusChange, StoreError, StoreResult};
use crate::jobs::{ImportJob, JobStatus, RowOutcome};
use crate::models::{
    CanonicalIngredient, IngredientId, IngredientNutrient, MeasurementType, Nutrient, RecipeId,
    ReferenceCounts,
};
use crate::parser::recipe::ParsedRecipe;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Constraint violations only fail the row; everything else keeps the
/// driver error for `is_fatal` to inspect.
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db) = err {
        if matches!(
            db.kind(),
            ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation
        ) {
            return StoreError::Constraint(db.message().to_string());
        }
    }
    StoreError::Database(err)
}

#[derive(FromRow)]
struct JobRow {
    process_id: Uuid,
    job_name: String,
    source: String,
    status: i16,
    total_records: Option<i64>,
    imported_count: i64,
    skipped_count: i64,
    error_count: i64,
    message: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for ImportJob {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = JobStatus::from_code(row.status).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "import job {} has unknown status {}",
                row.process_id, row.status
            ))
        })?;

        Ok(ImportJob {
            process_id: row.process_id,
            job_name: row.job_name,
            source: row.source,
            status,
            total_records: row.total_records,
            imported_count: row.imported_count,
            skipped_count: row.skipped_count,
            error_count: row.error_count,
            message: row.message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(FromRow)]
struct IngredientRow {
    id: i64,
    name: String,
    display_name: String,
    created_at: DateTime<Utc>,
}

impl From<IngredientRow> for CanonicalIngredient {
    fn from(row: IngredientRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            display_name: row.display_name,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct IngredientNutrientRow {
    ingredient_id: i64,
    nutrient_id: i64,
    amount: BigDecimal,
    unit: String,
    is_placeholder: bool,
    source: String,
}

impl From<IngredientNutrientRow> for IngredientNutrient {
    fn from(row: IngredientNutrientRow) -> Self {
        Self {
            ingredient_id: row.ingredient_id,
            nutrient_id: row.nutrient_id,
            amount: row.amount,
            unit: row.unit,
            is_placeholder: row.is_placeholder,
            source: row.source,
        }
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn insert_job(&self, job: &ImportJob) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO import_jobs (
                process_id, job_name, source, status, total_records,
                imported_count, skipped_count, error_count, message, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(job.process_id)
        .bind(&job.job_name)
        .bind(&job.source)
        .bind(job.status.code())
        .bind(job.total_records)
        .bind(job.imported_count)
        .bind(job.skipped_count)
        .bind(job.error_count)
        .bind(&job.message)
        .bind(job.created_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn fetch_job(&self, process_id: Uuid) -> StoreResult<Option<ImportJob>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT process_id, job_name, source, status, total_records,
                   imported_count, skipped_count, error_count, message,
                   created_at, started_at, completed_at
            FROM import_jobs
            WHERE process_id = $1
            "#,
        )
        .bind(process_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ImportJob::try_from).transpose()
    }

    async fn transition(&self, process_id: Uuid, change: &StatusChange) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE import_jobs
            SET status = $3,
                started_at = COALESCE($4, started_at),
                completed_at = COALESCE($5, completed_at),
                message = COALESCE($6, message)
            WHERE process_id = $1 AND status = $2
            "#,
        )
        .bind(process_id)
        .bind(change.from.code())
        .bind(change.to.code())
        .bind(change.started_at)
        .bind(change.completed_at)
        .bind(&change.message)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_total_records(&self, process_id: Uuid, total: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE import_jobs
            SET total_records = $2
            WHERE process_id = $1 AND status IN (0, 1)
            "#,
        )
        .bind(process_id)
        .bind(total)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(result.rows_affected() == 1)
    }

    async fn increment_outcome(
        &self,
        process_id: Uuid,
        outcome: RowOutcome,
    ) -> StoreResult<bool> {
        let column = match outcome {
            RowOutcome::Imported => "imported_count",
            RowOutcome::Skipped => "skipped_count",
            RowOutcome::Error => "error_count",
        };
        let sql = format!(
            r#"
            UPDATE import_jobs
            SET {column} = {column} + 1,
                total_records = CASE
                    WHEN total_records IS NULL THEN NULL
                    ELSE GREATEST(total_records, imported_count + skipped_count + error_count + 1)
                END
            WHERE process_id = $1 AND status = $2
            "#
        );

        let result = sqlx::query(&sql)
            .bind(process_id)
            .bind(JobStatus::Running.code())
            .execute(&self.pool)
            .await
            .map_err(classify)?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_message(&self, process_id: Uuid, message: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE import_jobs
            SET message = $2
            WHERE process_id = $1 AND status IN (0, 1)
            "#,
        )
        .bind(process_id)
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn find_or_create_measurement_type(
        &self,
        name: &str,
    ) -> StoreResult<(MeasurementType, bool)> {
        let inserted: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO measurement_types (name)
            VALUES ($1)
            ON CONFLICT (name) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        let (id, created) = match inserted {
            Some((id,)) => (id, true),
            None => {
                let (id,): (i64,) =
                    sqlx::query_as("SELECT id FROM measurement_types WHERE name = $1")
                        .bind(name)
                        .fetch_one(&self.pool)
                        .await?;
                (id, false)
            },
        };

        Ok((
            MeasurementType {
                id,
                name: name.to_string(),
            },
            created,
        ))
    }

    async fn find_or_create_nutrient(
        &self,
        name: &str,
        unit: &str,
    ) -> StoreResult<(Nutrient, bool)> {
        let inserted: Option<(i64, String)> = sqlx::query_as(
            r#"
            INSERT INTO nutrients (name, unit)
            VALUES ($1, $2)
            ON CONFLICT (name) DO NOTHING
            RETURNING id, unit
            "#,
        )
        .bind(name)
        .bind(unit)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        let (id, unit, created) = match inserted {
            Some((id, unit)) => (id, unit, true),
            None => {
                let (id, unit): (i64, String) =
                    sqlx::query_as("SELECT id, unit FROM nutrients WHERE name = $1")
                        .bind(name)
                        .fetch_one(&self.pool)
                        .await?;
                (id, unit, false)
            },
        };

        Ok((
            Nutrient {
                id,
                name: name.to_string(),
                unit,
            },
            created,
        ))
    }

    async fn list_measurement_types(&self) -> StoreResult<Vec<MeasurementType>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM measurement_types ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| MeasurementType { id, name })
            .collect())
    }

    async fn count_reference_rows(&self) -> StoreResult<ReferenceCounts> {
        let (measurement_types, nutrients): (i64, i64) = sqlx::query_as(
            r#"
            SELECT (SELECT COUNT(*) FROM measurement_types),
                   (SELECT COUNT(*) FROM nutrients)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(ReferenceCounts {
            measurement_types: measurement_types as u64,
            nutrients: nutrients as u64,
        })
    }

    async fn find_ingredient(
        &self,
        normalized_name: &str,
    ) -> StoreResult<Option<CanonicalIngredient>> {
        let row = sqlx::query_as::<_, IngredientRow>(
            r#"
            SELECT id, name, display_name, created_at
            FROM ingredients
            WHERE name = $1
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(normalized_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CanonicalIngredient::from))
    }

    async fn create_ingredient(
        &self,
        normalized_name: &str,
        display_name: &str,
    ) -> StoreResult<CanonicalIngredient> {
        let row = sqlx::query_as::<_, IngredientRow>(
            r#"
            INSERT INTO ingredients (name, display_name)
            VALUES ($1, $2)
            RETURNING id, name, display_name, created_at
            "#,
        )
        .bind(normalized_name)
        .bind(display_name)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;

        Ok(row.into())
    }

    async fn ingredient_nutrients(
        &self,
        ingredient_id: IngredientId,
    ) -> StoreResult<Vec<IngredientNutrient>> {
        let rows = sqlx::query_as::<_, IngredientNutrientRow>(
            r#"
            SELECT ingredient_id, nutrient_id, amount, unit, is_placeholder, source
            FROM ingredient_nutrients
            WHERE ingredient_id = $1
            ORDER BY nutrient_id
            "#,
        )
        .bind(ingredient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(IngredientNutrient::from).collect())
    }

    async fn insert_ingredient_nutrient_if_absent(
        &self,
        association: &IngredientNutrient,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO ingredient_nutrients (
                ingredient_id, nutrient_id, amount, unit, is_placeholder, source
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (ingredient_id, nutrient_id) DO NOTHING
            "#,
        )
        .bind(association.ingredient_id)
        .bind(association.nutrient_id)
        .bind(&association.amount)
        .bind(&association.unit)
        .bind(association.is_placeholder)
        .bind(&association.source)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(result.rows_affected() == 1)
    }

    async fn save_ingredient_nutrient(&self, association: &IngredientNutrient) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ingredient_nutrients (
                ingredient_id, nutrient_id, amount, unit, is_placeholder, source
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (ingredient_id, nutrient_id)
            DO UPDATE SET amount = EXCLUDED.amount,
                          unit = EXCLUDED.unit,
                          is_placeholder = EXCLUDED.is_placeholder,
                          source = EXCLUDED.source
            "#,
        )
        .bind(association.ingredient_id)
        .bind(association.nutrient_id)
        .bind(&association.amount)
        .bind(&association.unit)
        .bind(association.is_placeholder)
        .bind(&association.source)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn insert_recipe(
        &self,
        process_id: Uuid,
        recipe: &ParsedRecipe,
    ) -> StoreResult<RecipeId> {
        let mut tx = self.pool.begin().await?;

        let (recipe_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO recipes (
                process_id, source_record, name, description, instructions,
                cook_time_minutes, servings
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(process_id)
        .bind(recipe.source_record as i64)
        .bind(&recipe.name)
        .bind(&recipe.description)
        .bind(&recipe.instructions)
        .bind(recipe.cook_time_minutes)
        .bind(recipe.servings)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        for step in &recipe.steps {
            sqlx::query(
                r#"
                INSERT INTO recipe_steps (recipe_id, step_number, summary, description)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(recipe_id)
            .bind(step.step_number)
            .bind(&step.summary)
            .bind(&step.description)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        }

        for line in &recipe.ingredients {
            sqlx::query(
                r#"
                INSERT INTO recipe_ingredients (
                    recipe_id, position, ingredient_id, measurement_type_id,
                    quantity, original_text
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(recipe_id)
            .bind(line.position)
            .bind(line.ingredient_id)
            .bind(line.unit.measurement_type_id())
            .bind(&line.quantity)
            .bind(&line.original_text)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        }

        tx.commit().await?;
        Ok(recipe_id)
    }
}
