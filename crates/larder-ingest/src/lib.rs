//! Larder Ingest Library
//!
//! Background ingestion of tabular recipe data.
//!
//! # Overview
//!
//! - **Jobs**: persisted import jobs with a forward-only state machine,
//!   row-outcome counters and a status query
//! - **Sources**: lazy row readers over CSV files or in-memory datasets
//! - **Parsers**: ingredient lines, instruction steps and whole recipes
//! - **Nutrients**: baseline placeholder facts with optional USDA
//!   FoodData Central enrichment
//! - **Stores**: Postgres (`sqlx`) and in-memory persistence behind traits
//!
//! # Architecture
//!
//! ```text
//! start_import ──► JobRunner ──► execute_ingestion
//!                                   │
//!                 RowReader ◄───────┤ per row
//!                 RecipeParser ◄────┤  ├─ IngredientParser
//!                                   │  ├─ StepParser
//!                                   │  └─ NutrientIntegrator
//!                 CatalogStore ◄────┤ insert_recipe
//!                 JobTracker ◄──────┘ record_row_outcome
//! ```
//!
//! # Example
//!
//! ```no_run
//! use larder_ingest::{orchestrator::IngestionOrchestrator, source::SourceDescriptor};
//!
//! # async fn run(orchestrator: IngestionOrchestrator) -> anyhow::Result<()> {
//! let started = orchestrator
//!     .start_import(SourceDescriptor::new("recipes.csv"), "weekly import")
//!     .await?;
//! let status = orchestrator.get_import_status(started.process_id).await?;
//! println!("{}", serde_json::to_string_pretty(&status)?);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod models;
pub mod nutrients;
pub mod orchestrator;
pub mod parser;
pub mod seed;
pub mod source;
pub mod store;

pub use error::{IngestError, Result};
pub use orchestrator::{IngestionOrchestrator, StartImportResult};
