//! Detached execution path.
//!
//! After-hooks and audit writes run here, off the caller's request. Tasks
//! are tracked in a [`JoinSet`] and bounded by a [`Semaphore`]; their
//! completion is not ordered relative to the response. Failures are caught
//! at this boundary and logged, never surfaced or retried.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use strata_core::StrataResult;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

/// Bounded pool of fire-and-forget tasks.
#[derive(Debug)]
pub struct DetachedExecutor {
    tasks: Mutex<JoinSet<()>>,
    permits: Arc<Semaphore>,
}

impl DetachedExecutor {
    /// Create an executor allowing `concurrency` tasks to run at once.
    pub fn new(concurrency: usize) -> Self {
        Self {
            tasks: Mutex::new(JoinSet::new()),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn a task on the current runtime. Must be called from within a
    /// tokio runtime context.
    pub fn spawn<F>(&self, label: &'static str, fut: F)
    where
        F: Future<Output = StrataResult<()>> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let task = async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::warn!(task = label, "Detached executor closed, task dropped");
                return;
            };
            if let Err(e) = fut.await {
                tracing::warn!(task = label, error = %e, "Detached task failed");
            }
        };

        let mut tasks = self.tasks();
        while let Some(done) = tasks.try_join_next() {
            log_join(done);
        }
        tasks.spawn(task);
    }

    /// Tasks spawned and not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.tasks().len()
    }

    /// Wait for every in-flight task, including tasks spawned while
    /// draining.
    pub async fn drain(&self) {
        loop {
            let mut batch = std::mem::take(&mut *self.tasks());
            if batch.is_empty() {
                return;
            }
            while let Some(done) = batch.join_next().await {
                log_join(done);
            }
        }
    }
}

fn log_join(result: Result<(), JoinError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_panic() => tracing::error!(error = %e, "Detached task panicked"),
        Err(e) => tracing::debug!(error = %e, "Detached task cancelled"),
    }
}
