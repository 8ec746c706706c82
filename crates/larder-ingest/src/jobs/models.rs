//! Import job record and status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Import job status
///
/// The numeric codes are part of the persisted and reported format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum JobStatus {
    Queued = 0,
    Running = 1,
    Completed = 2,
    Failed = 3,
    Canceled = 4,
}

impl JobStatus {
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(JobStatus::Queued),
            1 => Some(JobStatus::Running),
            2 => Some(JobStatus::Completed),
            3 => Some(JobStatus::Failed),
            4 => Some(JobStatus::Canceled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled)
    }

    /// Allowed edges of the forward-only state machine
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Failed)
                | (Queued, Canceled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Canceled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one processed row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    Imported,
    Skipped,
    Error,
}

/// Import job (maps to the import_jobs table)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportJob {
    pub process_id: Uuid,
    pub job_name: String,
    /// Source descriptor the job reads from
    pub source: String,
    pub status: JobStatus,
    pub total_records: Option<i64>,
    pub imported_count: i64,
    pub skipped_count: i64,
    pub error_count: i64,
    /// Latest progress or error text
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    /// Fresh Queued job with a new process id
    pub fn new(job_name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            process_id: Uuid::new_v4(),
            job_name: job_name.into(),
            source: source.into(),
            status: JobStatus::Queued,
            total_records: None,
            imported_count: 0,
            skipped_count: 0,
            error_count: 0,
            message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Rows classified so far
    pub fn processed(&self) -> i64 {
        self.imported_count + self.skipped_count + self.error_count
    }

    pub fn progress_percentage(&self) -> Option<f64> {
        self.total_records.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.processed() as f64 / total as f64) * 100.0
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobStatus; 5] = [
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Canceled,
    ];

    #[test]
    fn test_status_codes() {
        assert_eq!(JobStatus::Queued.code(), 0);
        assert_eq!(JobStatus::Running.code(), 1);
        assert_eq!(JobStatus::Completed.code(), 2);
        assert_eq!(JobStatus::Failed.code(), 3);
        assert_eq!(JobStatus::Canceled.code(), 4);
        for status in ALL {
            assert_eq!(JobStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(JobStatus::from_code(5), None);
    }

    #[test]
    fn test_terminal_states_are_final() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_completed_only_from_running() {
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn test_no_backward_edges() {
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Canceled));
    }

    #[test]
    fn test_progress_percentage() {
        let mut job = ImportJob::new("weekly", "recipes.csv");
        assert_eq!(job.progress_percentage(), None);

        job.total_records = Some(8);
        job.imported_count = 3;
        job.error_count = 1;
        assert_eq!(job.processed(), 4);
        assert_eq!(job.progress_percentage(), Some(50.0));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::Canceled).unwrap_or_default();
        assert_eq!(json, "\"canceled\"");
    }
}
