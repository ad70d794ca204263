//! Executor errors.

use benchmesh_cluster::TransportError;
use benchmesh_core::{CoreError, JobId, Phase};
use benchmesh_runtime::{BackendError, PoolError};

/// Executor result type
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Executor errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// Protocol violation between this node, the master, or the backend
    #[error("benchmark [{job_id}]: {reason}")]
    IllegalState {
        /// Benchmark affected
        job_id: JobId,
        /// What was violated
        reason: String,
    },

    /// Coordinator declared a phase this node cannot act on
    #[error("benchmark [{job_id}]: illegal phase [{phase}]")]
    IllegalPhase {
        /// Benchmark affected
        job_id: JobId,
        /// Declared phase
        phase: Phase,
    },

    /// Backend operation failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Bench job never ran to completion
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// Round trip to the master failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(#[from] CoreError),
}

impl ExecutorError {
    /// Shorthand for an illegal-state error
    #[must_use]
    pub fn illegal_state(job_id: &JobId, reason: impl Into<String>) -> Self {
        Self::IllegalState {
            job_id: job_id.clone(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illegal_state_display() {
        let err = ExecutorError::illegal_state(&JobId::from("b1"), "missing internal state");
        assert_eq!(err.to_string(), "benchmark [b1]: missing internal state");
    }

    #[test]
    fn test_illegal_phase_display() {
        let err = ExecutorError::IllegalPhase {
            job_id: JobId::from("b1"),
            phase: Phase::Unknown,
        };
        assert_eq!(err.to_string(), "benchmark [b1]: illegal phase [UNKNOWN]");
    }

    #[test]
    fn test_from_backend_error() {
        let err: ExecutorError = BackendError::CreateFailed("no index".to_string()).into();
        assert!(matches!(err, ExecutorError::Backend(_)));
    }
}
