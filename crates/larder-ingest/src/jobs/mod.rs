//! Import jobs: persisted record, state machine, runner and status query

pub mod models;
pub mod runner;
pub mod status;
pub mod tracker;

pub use models::{ImportJob, JobStatus, RowOutcome};
pub use runner::{JobRunner, RunnerError};
pub use status::{GetImportStatusError, GetImportStatusQuery, ImportStatusResponse};
pub use tracker::{JobTracker, TrackerError};
