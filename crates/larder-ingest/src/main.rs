//! Larder Ingest - recipe import tool

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use larder_common::logging::{init_logging, LogConfig, LogLevel};
use larder_ingest::{
    config::IngestConfig,
    db,
    jobs::{ImportStatusResponse, JobStatus},
    nutrients::{FdcClient, FoodLookup},
    orchestrator::{IngestionOrchestrator, OrchestratorSettings},
    seed::ReferenceSeeder,
    source::{CsvFileSource, SourceDescriptor},
    store::{CatalogStore, JobStore, MemoryStore, PgStore},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "larder-ingest")]
#[command(author, version, about = "Larder recipe ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create missing measurement types and baseline nutrients
    Seed,

    /// Import recipes from a CSV file and wait for the job to finish
    Import {
        /// Path to the CSV file
        path: String,

        /// Job name shown in status reports
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show the status of an import job (requires DATABASE_URL)
    Status {
        /// Process id returned by `import`
        process_id: Uuid,
    },
}

struct Stores {
    jobs: Arc<dyn JobStore>,
    catalog: Arc<dyn CatalogStore>,
}

async fn connect(config: &IngestConfig) -> Result<Stores> {
    match &config.database {
        Some(db_config) => {
            let pool = db::create_pool(db_config)
                .await
                .context("Failed to connect to database")?;
            db::run_migrations(&pool).await?;
            db::health_check(&pool).await?;
            let store = Arc::new(PgStore::new(pool));
            Ok(Stores {
                jobs: store.clone(),
                catalog: store,
            })
        },
        None => {
            warn!("DATABASE_URL not set; using in-memory store (nothing is persisted)");
            let store = Arc::new(MemoryStore::new());
            Ok(Stores {
                jobs: store.clone(),
                catalog: store,
            })
        },
    }
}

fn food_lookup(config: &IngestConfig) -> Result<Option<Arc<dyn FoodLookup>>> {
    let lookup = &config.nutrient_lookup;
    match (&lookup.api_key, lookup.enabled) {
        (Some(api_key), true) => {
            let client = FdcClient::new(&lookup.base_url, api_key, lookup.timeout())?;
            Ok(Some(Arc::new(client)))
        },
        _ => Ok(None),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
    {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

async fn wait_for_terminal(
    orchestrator: &IngestionOrchestrator,
    process_id: Uuid,
) -> Result<ImportStatusResponse> {
    let bar = progress_bar();
    let mut interrupted = false;

    loop {
        let status = orchestrator.get_import_status(process_id).await?;
        if let Some(total) = status.total_records {
            bar.set_length(total.max(0) as u64);
        }
        bar.set_position(
            (status.imported_count + status.skipped_count + status.error_count).max(0) as u64,
        );
        bar.set_message(status.status.to_string());

        if status.status.is_terminal() {
            bar.finish_with_message(status.status.to_string());
            return Ok(status);
        }

        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {},
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                warn!("Interrupted; canceling import at the next row");
                orchestrator.cancel_import(process_id).await?;
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("larder-ingest")
        .build();
    let log_config = LogConfig::from_env_with_defaults(log_config)?;
    let _log_guard = init_logging(&log_config)?;

    let config = IngestConfig::from_env()?;

    match cli.command {
        Command::Seed => {
            let stores = connect(&config).await?;
            let report = ReferenceSeeder::new(stores.catalog)
                .seed_reference_data()
                .await?;
            print_json(&report)?;
        },
        Command::Import { path, name } => {
            let stores = connect(&config).await?;
            let orchestrator = IngestionOrchestrator::new(
                stores.jobs,
                stores.catalog,
                Arc::new(CsvFileSource::new(config.count_threshold_bytes)),
                food_lookup(&config)?,
                OrchestratorSettings::from(&config),
            );

            let job_name = name.unwrap_or_else(|| format!("import {}", path));
            let started = orchestrator
                .start_import(SourceDescriptor::new(&path), &job_name)
                .await?;
            if !started.success {
                print_json(&started)?;
                bail!("{}", started.message);
            }
            info!(process_id = %started.process_id, "Import started");

            let status = wait_for_terminal(&orchestrator, started.process_id).await?;
            print_json(&status)?;
            if status.status == JobStatus::Failed {
                bail!(
                    "Import {} failed: {}",
                    status.process_id,
                    status.message.unwrap_or_default()
                );
            }
        },
        Command::Status { process_id } => {
            if config.database.is_none() {
                bail!("DATABASE_URL must be set to look up jobs from earlier runs");
            }
            let stores = connect(&config).await?;
            let orchestrator = IngestionOrchestrator::new(
                stores.jobs,
                stores.catalog,
                Arc::new(CsvFileSource::new(config.count_threshold_bytes)),
                None,
                OrchestratorSettings::from(&config),
            );
            print_json(&orchestrator.get_import_status(process_id).await?)?;
        },
    }

    Ok(())
}
