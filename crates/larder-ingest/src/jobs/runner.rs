//! Background job runner
//!
//! Spawns one tokio task per submitted job, bounded by a semaphore, and keeps
//! a cancellation token for each active job. A process id can only have one
//! active run at a time.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RunnerError {
    #[error("Import job '{0}' is already running")]
    AlreadyActive(Uuid),
}

type ActiveJobs = Arc<Mutex<HashMap<Uuid, CancellationToken>>>;

#[derive(Clone)]
pub struct JobRunner {
    active: ActiveJobs,
    permits: Arc<Semaphore>,
}

fn lock(active: &ActiveJobs) -> MutexGuard<'_, HashMap<Uuid, CancellationToken>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the job's entry when the task ends, including on panic
struct ActiveEntry {
    active: ActiveJobs,
    process_id: Uuid,
}

impl Drop for ActiveEntry {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.process_id);
    }
}

impl JobRunner {
    pub fn new(max_concurrent_jobs: usize) -> Self {
        Self {
            active: Arc::new(Mutex::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    /// Spawn `task` for `process_id`
    ///
    /// The task receives the job's cancellation token. It waits for a free
    /// slot before running.
    pub fn submit<F, Fut>(&self, process_id: Uuid, task: F) -> Result<JoinHandle<()>, RunnerError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        {
            let mut active = lock(&self.active);
            if active.contains_key(&process_id) {
                return Err(RunnerError::AlreadyActive(process_id));
            }
            active.insert(process_id, token.clone());
        }

        let entry = ActiveEntry {
            active: Arc::clone(&self.active),
            process_id,
        };
        let permits = Arc::clone(&self.permits);

        Ok(tokio::spawn(async move {
            let _entry = entry;
            // The semaphore is never closed, so acquire cannot fail.
            let _permit = permits.acquire_owned().await.ok();
            debug!(process_id = %process_id, "Job slot acquired");
            task(token).await;
        }))
    }

    /// Signal cancellation; returns false when the job is not active
    pub fn cancel(&self, process_id: Uuid) -> bool {
        match lock(&self.active).get(&process_id) {
            Some(token) => {
                token.cancel();
                true
            },
            None => false,
        }
    }

    pub fn is_active(&self, process_id: Uuid) -> bool {
        lock(&self.active).contains_key(&process_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_duplicate_submission_is_rejected() {
        let runner = JobRunner::new(2);
        let id = Uuid::new_v4();
        let (release, wait) = oneshot::channel::<()>();

        let handle = runner
            .submit(id, |_| async move {
                let _ = wait.await;
            })
            .unwrap();

        assert!(runner.is_active(id));
        assert_eq!(
            runner.submit(id, |_| async {}).unwrap_err(),
            RunnerError::AlreadyActive(id)
        );

        release.send(()).unwrap();
        handle.await.unwrap();
        assert!(!runner.is_active(id));
    }

    #[tokio::test]
    async fn test_cancel_reaches_task() {
        let runner = JobRunner::new(1);
        let id = Uuid::new_v4();

        let handle = runner
            .submit(id, |token| async move {
                token.cancelled().await;
            })
            .unwrap();

        assert!(runner.cancel(id));
        handle.await.unwrap();
        assert!(!runner.cancel(id));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let runner = JobRunner::new(1);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                runner
                    .submit(Uuid::new_v4(), move |_| async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .unwrap()
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_entry_removed_after_panic() {
        let runner = JobRunner::new(1);
        let id = Uuid::new_v4();

        let handle = runner
            .submit(id, |_| async {
                panic!("boom");
            })
            .unwrap();

        assert!(handle.await.is_err());
        assert!(!runner.is_active(id));
    }
}
