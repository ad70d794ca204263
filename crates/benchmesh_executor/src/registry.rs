//! Local job registry.

use crate::guard::InternalExecutorState;
use benchmesh_core::JobId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Execution states of the benchmarks assigned to this node
///
/// The map lock only covers membership; each state carries its own lock so
/// transitions of one benchmark never wait on another.
#[derive(Debug, Default)]
pub struct LocalJobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<InternalExecutorState>>>,
}

impl LocalJobRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the state for a benchmark
    ///
    /// Returns `None` if the benchmark already has one.
    pub async fn create(&self, job_id: &JobId) -> Option<Arc<InternalExecutorState>> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job_id) {
            return None;
        }
        let state = Arc::new(InternalExecutorState::new(job_id.clone()));
        jobs.insert(job_id.clone(), Arc::clone(&state));
        Some(state)
    }

    /// Get the state of a benchmark
    pub async fn get(&self, job_id: &JobId) -> Option<Arc<InternalExecutorState>> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// Drop the state of a benchmark
    pub async fn remove(&self, job_id: &JobId) -> Option<Arc<InternalExecutorState>> {
        self.jobs.write().await.remove(job_id)
    }

    /// Whether a benchmark has state on this node
    pub async fn contains(&self, job_id: &JobId) -> bool {
        self.jobs.read().await.contains_key(job_id)
    }

    /// Benchmarks with state on this node
    pub async fn job_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.jobs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of benchmarks with state
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Whether no benchmark has state
    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
