//! Job tracker
//!
//! Sole writer of import job records. Every mutation goes through the
//! state machine in [`JobStatus::can_transition_to`] and is applied as a
//! conditional update, so a job can only ever move forward.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::models::{ImportJob, JobStatus, RowOutcome};
use crate::source::SourceDescriptor;
use crate::store::{JobStore, StatusChange, StoreError};

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Import job '{0}' not found")]
    NotFound(Uuid),

    #[error("Import job '{process_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        process_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Import job '{process_id}' is {status}, not running")]
    NotRunning { process_id: Uuid, status: JobStatus },

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),
}

pub type TrackerResult<T> = Result<T, TrackerError>;

#[derive(Clone)]
pub struct JobTracker {
    store: Arc<dyn JobStore>,
}

impl JobTracker {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Persist a new Queued job
    pub async fn create_job(
        &self,
        job_name: &str,
        source: &SourceDescriptor,
    ) -> TrackerResult<ImportJob> {
        let job = ImportJob::new(job_name, source.location());
        self.store.insert_job(&job).await?;
        debug!(process_id = %job.process_id, job_name, "Import job created");
        Ok(job)
    }

    /// Queued -> Running; sets StartedAt
    pub async fn mark_running(&self, process_id: Uuid) -> TrackerResult<()> {
        self.apply(process_id, JobStatus::Running, None).await
    }

    pub async fn set_total_records(&self, process_id: Uuid, total: u64) -> TrackerResult<()> {
        if !self
            .store
            .set_total_records(process_id, total as i64)
            .await?
        {
            return Err(self.not_running(process_id).await);
        }
        Ok(())
    }

    /// Increment exactly one counter of a Running job
    pub async fn record_row_outcome(
        &self,
        process_id: Uuid,
        outcome: RowOutcome,
    ) -> TrackerResult<()> {
        if !self.store.increment_outcome(process_id, outcome).await? {
            return Err(self.not_running(process_id).await);
        }
        Ok(())
    }

    /// Progress text for a job that has not finished
    pub async fn update_message(&self, process_id: Uuid, message: &str) -> TrackerResult<()> {
        if !self.store.set_message(process_id, message).await? {
            return Err(self.not_running(process_id).await);
        }
        Ok(())
    }

    /// Move to a terminal status; sets CompletedAt and Message
    pub async fn finalize(
        &self,
        process_id: Uuid,
        final_status: JobStatus,
        message: impl Into<String>,
    ) -> TrackerResult<()> {
        if !final_status.is_terminal() {
            let current = self.get_status(process_id).await?;
            return Err(TrackerError::InvalidTransition {
                process_id,
                from: current.status,
                to: final_status,
            });
        }
        self.apply(process_id, final_status, Some(message.into()))
            .await
    }

    pub async fn get_status(&self, process_id: Uuid) -> TrackerResult<ImportJob> {
        self.store
            .fetch_job(process_id)
            .await?
            .ok_or(TrackerError::NotFound(process_id))
    }

    async fn apply(
        &self,
        process_id: Uuid,
        to: JobStatus,
        message: Option<String>,
    ) -> TrackerResult<()> {
        let current = self.get_status(process_id).await?;
        if !current.status.can_transition_to(to) {
            return Err(TrackerError::InvalidTransition {
                process_id,
                from: current.status,
                to,
            });
        }

        let now = Utc::now();
        let change = StatusChange {
            from: current.status,
            to,
            started_at: (to == JobStatus::Running).then_some(now),
            completed_at: to.is_terminal().then_some(now),
            message,
        };

        if self.store.transition(process_id, &change).await? {
            debug!(process_id = %process_id, from = %current.status, to = %to, "Job status changed");
            return Ok(());
        }

        // Lost a race with another writer; report what it left behind.
        let latest = self.get_status(process_id).await?;
        Err(TrackerError::InvalidTransition {
            process_id,
            from: latest.status,
            to,
        })
    }

    async fn not_running(&self, process_id: Uuid) -> TrackerError {
        match self.get_status(process_id).await {
            Ok(job) => TrackerError::NotRunning {
                process_id,
                status: job.status,
            },
            Err(e) => e,
        }
    }
}
