//! Thread pools for backend calls and outbound messaging.
//!
//! Two lanes share one [`TaskTracker`]:
//!
//! - the generic lane runs outbound sends and short blocking backend calls
//!   (pause, resume, abort) so event processing never waits on them;
//! - the bench lane runs long workload executions on blocking threads,
//!   bounded by a semaphore so a burst of starts cannot starve the generic
//!   lane.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

/// Pool errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The bench lane was closed before the job got a slot
    #[error("Bench pool is shut down")]
    Closed,

    /// The job panicked or was cancelled
    #[error("Bench job did not complete: {0}")]
    Aborted(String),
}

/// Pools used by the executor service
#[derive(Clone)]
pub struct ThreadPools {
    /// Tracks every spawned task
    tracker: TaskTracker,
    /// Slots of the bench lane
    bench: Arc<Semaphore>,
    /// Bench lane size
    bench_size: usize,
}

impl ThreadPools {
    /// Create pools with the given bench lane size (at least one slot)
    #[must_use]
    pub fn new(bench_size: usize) -> Self {
        let bench_size = bench_size.max(1);
        Self {
            tracker: TaskTracker::new(),
            bench: Arc::new(Semaphore::new(bench_size)),
            bench_size,
        }
    }

    /// Number of concurrent bench executions allowed
    #[must_use]
    pub fn bench_size(&self) -> usize {
        self.bench_size
    }

    /// Run a future on the generic lane
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Run a blocking call on the generic lane
    pub fn spawn_blocking<F, T>(&self, call: F) -> JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.tracker.spawn_blocking(call)
    }

    /// Run a long blocking job on the bench lane
    ///
    /// The job waits for a free slot before it is handed to a blocking
    /// thread.
    pub fn spawn_bench<F, T>(&self, job: F) -> JoinHandle<Result<T, PoolError>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let lane = Arc::clone(&self.bench);
        self.tracker.spawn(async move {
            let Ok(_permit) = lane.acquire_owned().await else {
                tracing::warn!("bench pool closed, dropping job");
                return Err(PoolError::Closed);
            };
            tokio::task::spawn_blocking(job)
                .await
                .map_err(|e| PoolError::Aborted(e.to_string()))
        })
    }

    /// Number of tasks still in flight
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every task spawned so far, and every task those spawn,
    /// has finished. New tasks may be spawned afterwards.
    pub async fn quiesce(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stop handing out bench slots and wait for in-flight work
    pub async fn shutdown(&self) {
        self.bench.close();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Default for ThreadPools {
    fn default() -> Self {
        Self::new(1)
    }
}
