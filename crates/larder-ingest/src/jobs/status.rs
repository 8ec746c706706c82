//! Import status query
//!
//! Read-only snapshot of one import job, shaped for polling clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::models::{ImportJob, JobStatus};
use super::tracker::{JobTracker, TrackerError};
use crate::store::StoreError;

/// Query to get an import job by process id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetImportStatusQuery {
    pub process_id: Uuid,
}

/// Status snapshot returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStatusResponse {
    pub process_id: Uuid,
    pub job_name: String,
    pub status: JobStatus,
    pub status_code: i16,
    pub message: Option<String>,
    pub total_records: Option<i64>,
    pub imported_count: i64,
    pub skipped_count: i64,
    pub error_count: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<ImportJob> for ImportStatusResponse {
    fn from(job: ImportJob) -> Self {
        let progress_percentage = job.progress_percentage();
        Self {
            process_id: job.process_id,
            job_name: job.job_name,
            status: job.status,
            status_code: job.status.code(),
            message: job.message,
            total_records: job.total_records,
            imported_count: job.imported_count,
            skipped_count: job.skipped_count,
            error_count: job.error_count,
            created_at: job.created_at,
            progress_percentage,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GetImportStatusError {
    #[error("Import job '{0}' not found")]
    NotFound(Uuid),
    #[error("Job store error: {0}")]
    Store(#[from] StoreError),
}

pub async fn handle(
    tracker: &JobTracker,
    query: GetImportStatusQuery,
) -> Result<ImportStatusResponse, GetImportStatusError> {
    match tracker.get_status(query.process_id).await {
        Ok(job) => Ok(job.into()),
        Err(TrackerError::NotFound(id)) => Err(GetImportStatusError::NotFound(id)),
        Err(TrackerError::Store(e)) => Err(GetImportStatusError::Store(e)),
        // get_status only reports lookup failures
        Err(other) => Err(GetImportStatusError::Store(StoreError::Corrupt(other.to_string()))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::source::SourceDescriptor;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_snapshot_uses_camel_case() {
        let tracker = JobTracker::new(Arc::new(MemoryStore::new()));
        let job = tracker
            .create_job("weekly", &SourceDescriptor::new("recipes.csv"))
            .await
            .unwrap();

        let response = handle(
            &tracker,
            GetImportStatusQuery {
                process_id: job.process_id,
            },
        )
        .await
        .unwrap();
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["status"], "queued");
        assert_eq!(json["statusCode"], 0);
        assert_eq!(json["importedCount"], 0);
        assert!(json["totalRecords"].is_null());
        assert!(json.get("startedAt").is_none());
        assert!(json.get("progressPercentage").is_none());
        assert_eq!(json["processId"], job.process_id.to_string());
    }

    #[tokio::test]
    async fn test_unknown_process_id() {
        let tracker = JobTracker::new(Arc::new(MemoryStore::new()));
        let missing = Uuid::new_v4();

        let err = handle(&tracker, GetImportStatusQuery { process_id: missing })
            .await
            .unwrap_err();
        assert!(matches!(err, GetImportStatusError::NotFound(id) if id == missing));
    }
}
