//! Ingestion orchestrator
//!
//! `start_import` probes the source, records a Queued job and hands the run
//! to the [`JobRunner`]; the caller gets the process id back immediately and
//! polls `get_import_status`. The run itself reads rows sequentially and
//! classifies each one as Imported, Skipped or Error. Only failures outside
//! a row (source read errors, an unreachable store) fail the job.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::jobs::status::{self, GetImportStatusError, GetImportStatusQuery, ImportStatusResponse};
use crate::jobs::{JobRunner, JobStatus, JobTracker, RowOutcome};
use crate::nutrients::{FoodLookup, NutrientIntegrator};
use crate::parser::{IngredientParser, RecipeParser, RowFailure, StepParser, UnitTable};
use crate::seed::ReferenceSeeder;
use crate::source::{RawRow, RecipeSource, SourceDescriptor};
use crate::store::{CatalogStore, JobStore};

/// Reply to `start_import`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartImportResult {
    pub success: bool,
    pub process_id: Uuid,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_concurrent_jobs: usize,
    /// Write a progress message every N rows; 0 is treated as 1
    pub progress_interval: u64,
    pub lookup_timeout: Duration,
    pub search_limit: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

impl From<&IngestConfig> for OrchestratorSettings {
    fn from(config: &IngestConfig) -> Self {
        Self {
            max_concurrent_jobs: config.max_concurrent_jobs,
            progress_interval: config.progress_interval.max(1),
            lookup_timeout: config.nutrient_lookup.timeout(),
            search_limit: config.nutrient_lookup.search_limit,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct RowCounts {
    imported: u64,
    skipped: u64,
    errors: u64,
}

impl RowCounts {
    fn add(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Imported => self.imported += 1,
            RowOutcome::Skipped => self.skipped += 1,
            RowOutcome::Error => self.errors += 1,
        }
    }

    fn processed(&self) -> u64 {
        self.imported + self.skipped + self.errors
    }

    fn completion_message(&self) -> String {
        if self.errors == 0 {
            format!(
                "Completed: {} imported, {} skipped",
                self.imported, self.skipped
            )
        } else {
            format!(
                "Completed with {} error(s): {} imported, {} skipped",
                self.errors, self.imported, self.skipped
            )
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[derive(Clone)]
pub struct IngestionOrchestrator {
    tracker: JobTracker,
    catalog: Arc<dyn CatalogStore>,
    source: Arc<dyn RecipeSource>,
    lookup: Option<Arc<dyn FoodLookup>>,
    runner: JobRunner,
    settings: OrchestratorSettings,
}

impl IngestionOrchestrator {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        catalog: Arc<dyn CatalogStore>,
        source: Arc<dyn RecipeSource>,
        lookup: Option<Arc<dyn FoodLookup>>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            tracker: JobTracker::new(jobs),
            catalog,
            source,
            lookup,
            runner: JobRunner::new(settings.max_concurrent_jobs),
            settings,
        }
    }

    /// Queue an import of `source`
    ///
    /// A source that cannot be opened is reported with `success = false`
    /// and recorded as a Failed job; no run is started.
    pub async fn start_import(
        &self,
        source: SourceDescriptor,
        job_name: &str,
    ) -> Result<StartImportResult> {
        if let Err(e) = self.source.probe(&source).await {
            let job = self.tracker.create_job(job_name, &source).await?;
            let message = format!("Source could not be opened: {}", e);
            self.tracker
                .finalize(job.process_id, JobStatus::Failed, message.clone())
                .await?;
            warn!(process_id = %job.process_id, source = %source, error = %e, "Import rejected");
            return Ok(StartImportResult {
                success: false,
                process_id: job.process_id,
                message,
            });
        }

        let job = self.tracker.create_job(job_name, &source).await?;
        let process_id = job.process_id;
        let this = self.clone();
        self.runner.submit(process_id, move |cancel| async move {
            this.execute_ingestion(process_id, source, cancel).await;
        })?;

        info!(process_id = %process_id, job_name, source = %job.source, "Import queued");
        Ok(StartImportResult {
            success: true,
            process_id,
            message: "Import queued".to_string(),
        })
    }

    /// Run one job to a terminal status. Never returns an error: anything
    /// that escapes the run, panics included, finalizes the job as Failed.
    #[instrument(name = "import", skip_all, fields(process_id = %process_id, source = %source))]
    pub async fn execute_ingestion(
        &self,
        process_id: Uuid,
        source: SourceDescriptor,
        cancel: CancellationToken,
    ) {
        let result = AssertUnwindSafe(self.run(process_id, &source, &cancel))
            .catch_unwind()
            .await;

        let failure = match result {
            Ok(Ok(status)) => {
                info!(status = %status, "Import finished");
                return;
            },
            Ok(Err(e)) => format!("Import failed: {}", e),
            Err(payload) => format!("Import aborted: {}", panic_message(payload.as_ref())),
        };

        error!(error = %failure, "Import failed");
        if let Err(e) = self
            .tracker
            .finalize(process_id, JobStatus::Failed, failure)
            .await
        {
            error!(error = %e, "Could not record import failure");
        }
    }

    async fn run(
        &self,
        process_id: Uuid,
        source: &SourceDescriptor,
        cancel: &CancellationToken,
    ) -> Result<JobStatus> {
        if cancel.is_cancelled() {
            self.tracker
                .finalize(process_id, JobStatus::Canceled, "Canceled before start")
                .await?;
            return Ok(JobStatus::Canceled);
        }

        ReferenceSeeder::new(Arc::clone(&self.catalog))
            .seed_reference_data()
            .await?;
        let units = UnitTable::from_measurement_types(&self.catalog.list_measurement_types().await?);

        let mut reader = self.source.open(source).await?;
        let total = reader.total_hint();
        if let Some(total) = total {
            self.tracker.set_total_records(process_id, total).await?;
        }
        self.tracker.mark_running(process_id).await?;
        info!(total = ?total, "Import started");

        let mut parser = RecipeParser::new(
            IngredientParser::new(units, Arc::clone(&self.catalog)),
            StepParser::new()?,
            NutrientIntegrator::new(
                Arc::clone(&self.catalog),
                self.lookup.clone(),
                self.settings.lookup_timeout,
                self.settings.search_limit,
            ),
        );
        let mut counts = RowCounts::default();
        let progress_interval = self.settings.progress_interval.max(1);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let message = format!("Canceled after {} row(s)", counts.processed());
                    self.tracker
                        .finalize(process_id, JobStatus::Canceled, message)
                        .await?;
                    info!(processed = counts.processed(), "Import canceled");
                    return Ok(JobStatus::Canceled);
                }
                next = reader.next_row() => next,
            };
            let Some(next) = next else {
                break;
            };

            let outcome = match next {
                Ok(row) => self.process_row(&mut parser, process_id, &row).await?,
                Err(e) if e.is_row_level() => {
                    warn!(error = %e, "Row could not be read");
                    RowOutcome::Error
                },
                Err(e) => return Err(e.into()),
            };

            self.tracker.record_row_outcome(process_id, outcome).await?;
            counts.add(outcome);
            if total.is_some_and(|total| counts.processed() == total + 1) {
                warn!(
                    total = ?total,
                    "Source has more rows than counted; total raised as rows arrive"
                );
            }

            if counts.processed() % progress_interval == 0 {
                let message = match total {
                    Some(total) => format!("Processed {} of {} rows", counts.processed(), total),
                    None => format!("Processed {} rows", counts.processed()),
                };
                self.tracker.update_message(process_id, &message).await?;
            }
        }

        self.tracker
            .finalize(process_id, JobStatus::Completed, counts.completion_message())
            .await?;
        info!(
            imported = counts.imported,
            skipped = counts.skipped,
            errors = counts.errors,
            "Import completed"
        );
        Ok(JobStatus::Completed)
    }

    /// Parse and persist one row. Only connectivity failures escape.
    async fn process_row(
        &self,
        parser: &mut RecipeParser,
        process_id: Uuid,
        row: &RawRow,
    ) -> Result<RowOutcome> {
        let record = row.record_number;
        let recipe = match parser.parse(row).await {
            Ok(recipe) => recipe,
            Err(RowFailure::Skip(reason)) => {
                warn!(record, reason = %reason, "Row skipped");
                return Ok(RowOutcome::Skipped);
            },
            Err(RowFailure::Malformed(reason)) => {
                warn!(record, reason = %reason, "Row rejected");
                return Ok(RowOutcome::Error);
            },
            Err(RowFailure::Store(e)) if e.is_fatal() => return Err(IngestError::Store(e)),
            Err(RowFailure::Store(e)) => {
                warn!(record, error = %e, "Row could not be parsed");
                return Ok(RowOutcome::Error);
            },
        };

        match self.catalog.insert_recipe(process_id, &recipe).await {
            Ok(recipe_id) => {
                debug!(record, recipe_id, "Recipe stored");
                Ok(RowOutcome::Imported)
            },
            Err(e) if e.is_fatal() => Err(IngestError::Store(e)),
            Err(e) => {
                warn!(record, error = %e, "Recipe could not be stored");
                Ok(RowOutcome::Error)
            },
        }
    }

    /// Ask a running job to stop at the next row boundary
    ///
    /// Returns false when the job exists but has no active run.
    pub async fn cancel_import(&self, process_id: Uuid) -> Result<bool> {
        if self.runner.cancel(process_id) {
            info!(process_id = %process_id, "Cancellation requested");
            return Ok(true);
        }
        self.tracker.get_status(process_id).await?;
        Ok(false)
    }

    pub async fn get_import_status(
        &self,
        process_id: Uuid,
    ) -> std::result::Result<ImportStatusResponse, GetImportStatusError> {
        status::handle(&self.tracker, GetImportStatusQuery { process_id }).await
    }

    pub fn is_running(&self, process_id: Uuid) -> bool {
        self.runner.is_active(process_id)
    }
}
