//! Execution backend contract.
//!
//! The backend performs the actual workload. The executor service only
//! drives it through [`ExecutionBackend`]; every call may block, so callers
//! keep them off the event-processing path.

use benchmesh_core::JobId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Backend errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// No workload exists for the benchmark
    #[error("No workload for benchmark {0}")]
    UnknownBenchmark(JobId),

    /// Workload could not be created
    #[error("Failed to create workload: {0}")]
    CreateFailed(String),

    /// Operation rejected in the workload's current state
    #[error("Invalid transition for {job_id}: {reason}")]
    InvalidTransition {
        /// Benchmark the operation targeted
        job_id: JobId,
        /// Why it was rejected
        reason: String,
    },

    /// Workload failed while executing
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Definition of a benchmark, fetched once from the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkDefinition {
    /// Benchmark this definition belongs to
    pub job_id: JobId,
    /// Number of iterations to run
    pub iterations: u64,
    /// Concurrent requests per iteration
    pub concurrency: usize,
    /// Workload parameters, opaque to the executor
    pub parameters: BTreeMap<String, String>,
}

impl BenchmarkDefinition {
    /// Create a new definition
    #[must_use]
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            iterations: 1,
            concurrency: 1,
            parameters: BTreeMap::new(),
        }
    }

    /// Set iteration count
    #[must_use]
    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set concurrency
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Add a workload parameter
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Result codes reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BenchmarkState {
    /// Workload created, not started
    Initializing,
    /// Executing
    Running,
    /// Paused mid-run
    Paused,
    /// Finished every iteration
    Completed,
    /// Finished with errors
    Failed,
    /// Stopped by an abort
    Aborted,
    /// Code from a newer backend
    #[serde(other)]
    Unknown,
}

/// Outcome of a benchmark run on this node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkStartResponse {
    /// Benchmark the response belongs to
    pub job_id: JobId,
    /// Final backend state
    pub state: BenchmarkState,
    /// Iterations executed
    pub iterations_completed: u64,
    /// Summary statistics, keyed by metric name
    pub summary: BTreeMap<String, f64>,
    /// Errors encountered while running
    pub errors: Vec<String>,
}

impl BenchmarkStartResponse {
    /// Create a response in the given state
    #[must_use]
    pub fn new(job_id: JobId, state: BenchmarkState) -> Self {
        Self {
            job_id,
            state,
            iterations_completed: 0,
            summary: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    /// Set completed iterations
    #[must_use]
    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations_completed = iterations;
        self
    }

    /// Add a summary metric
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.summary.insert(name.into(), value);
        self
    }
}

/// Live status of a benchmark as seen by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkStatus {
    /// Benchmark queried
    pub job_id: JobId,
    /// Progress so far
    pub response: BenchmarkStartResponse,
    /// Internal backend error, if any
    pub error: Option<String>,
}

impl BenchmarkStatus {
    /// Create a healthy status
    #[must_use]
    pub fn new(response: BenchmarkStartResponse) -> Self {
        Self {
            job_id: response.job_id.clone(),
            response,
            error: None,
        }
    }

    /// Attach an internal error
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Whether the backend reported an internal error
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.error.is_some()
    }
}

/// Capability that runs benchmark workloads.
///
/// Calls are blocking. `start` returns only when the run has ended, either
/// by finishing or because `abort` was invoked from another thread; abort
/// is cooperative and must become effective in bounded time.
pub trait ExecutionBackend: Send + Sync {
    /// Prepare a workload from its definition
    ///
    /// # Errors
    ///
    /// Returns error if the workload cannot be created
    fn create(&self, definition: &BenchmarkDefinition) -> Result<(), BackendError>;

    /// Run the workload to completion
    ///
    /// # Errors
    ///
    /// Returns error if execution fails
    fn start(&self, definition: &BenchmarkDefinition) -> Result<BenchmarkStartResponse, BackendError>;

    /// Pause a running workload
    ///
    /// # Errors
    ///
    /// Returns error if the workload cannot be paused
    fn pause(&self, job_id: &JobId) -> Result<(), BackendError>;

    /// Resume a paused workload
    ///
    /// # Errors
    ///
    /// Returns error if the workload cannot be resumed
    fn resume(&self, job_id: &JobId) -> Result<(), BackendError>;

    /// Abort a workload
    ///
    /// # Errors
    ///
    /// Returns error if the abort signal cannot be delivered
    fn abort(&self, job_id: &JobId) -> Result<(), BackendError>;

    /// Query live status
    ///
    /// # Errors
    ///
    /// Returns error if the workload is unknown
    fn status(&self, job_id: &JobId) -> Result<BenchmarkStatus, BackendError>;

    /// Drop all state held for a benchmark
    fn clear(&self, job_id: &JobId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_builder() {
        let def = BenchmarkDefinition::new(JobId::from("b1"))
            .with_iterations(10)
            .with_concurrency(4)
            .with_parameter("index", "logs");
        assert_eq!(def.iterations, 10);
        assert_eq!(def.concurrency, 4);
        assert_eq!(def.parameters.get("index").map(String::as_str), Some("logs"));
    }

    #[test]
    fn test_status_errors() {
        let response = BenchmarkStartResponse::new(JobId::from("b1"), BenchmarkState::Running);
        let status = BenchmarkStatus::new(response.clone());
        assert!(!status.has_errors());
        assert_eq!(status.job_id, response.job_id);

        let status = status.with_error("shard failure");
        assert!(status.has_errors());
    }

    #[test]
    fn test_unknown_backend_state() {
        let state: BenchmarkState = serde_json::from_str("\"WARMING_UP\"").unwrap();
        assert_eq!(state, BenchmarkState::Unknown);
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::UnknownBenchmark(JobId::from("b9"));
        assert_eq!(err.to_string(), "No workload for benchmark b9");
    }
}
