//! Bounded pool for blocking store calls
//!
//! Blocking work runs on tokio's blocking threads; a semaphore caps how many
//! run at once so a burst of dispatches cannot monopolise the runtime's
//! blocking thread budget.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("worker pool is shut down")]
    Closed,

    #[error("blocking task failed: {0}")]
    Join(String),

    #[error("blocking task exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),
}

/// Runs blocking closures off the request-handling threads
#[derive(Clone)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
}

impl BlockingPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    /// Run `job` on a blocking thread once a worker slot is free
    ///
    /// With a deadline, the caller stops waiting once it passes; the job
    /// itself keeps running to completion and keeps its slot until then.
    pub async fn run<F, T>(&self, deadline: Option<Duration>, job: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        });

        let joined = match deadline {
            Some(limit) => tokio::time::timeout(limit, handle)
                .await
                .map_err(|_| PoolError::DeadlineExceeded(limit))?,
            None => handle.await,
        };

        joined.map_err(|e| PoolError::Join(e.to_string()))
    }
}
