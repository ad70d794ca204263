//! Backend result codes to coordinator-visible node states.

use crate::error::{ExecutorError, ExecutorResult};
use benchmesh_core::{JobId, NodeState};
use benchmesh_runtime::BenchmarkState;

/// Translate the state a backend run ended in
///
/// # Errors
///
/// Returns an illegal-state error for codes this node does not know, which
/// means the backend speaks a different protocol version.
pub fn to_node_state(job_id: &JobId, state: BenchmarkState) -> ExecutorResult<NodeState> {
    match state {
        BenchmarkState::Initializing => Ok(NodeState::Initializing),
        BenchmarkState::Running => Ok(NodeState::Running),
        BenchmarkState::Paused => Ok(NodeState::Paused),
        BenchmarkState::Completed => Ok(NodeState::Completed),
        BenchmarkState::Failed => Ok(NodeState::Failed),
        BenchmarkState::Aborted => Ok(NodeState::Aborted),
        BenchmarkState::Unknown => Err(ExecutorError::illegal_state(
            job_id,
            "unhandled benchmark response state",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        let id = JobId::from("b1");
        let cases = [
            (BenchmarkState::Initializing, NodeState::Initializing),
            (BenchmarkState::Running, NodeState::Running),
            (BenchmarkState::Paused, NodeState::Paused),
            (BenchmarkState::Completed, NodeState::Completed),
            (BenchmarkState::Failed, NodeState::Failed),
            (BenchmarkState::Aborted, NodeState::Aborted),
        ];
        for (code, expected) in cases {
            assert_eq!(to_node_state(&id, code), Ok(expected));
        }
    }

    #[test]
    fn test_unknown_code_is_illegal_state() {
        let err = to_node_state(&JobId::from("b1"), BenchmarkState::Unknown).unwrap_err();
        assert!(matches!(err, ExecutorError::IllegalState { .. }));
    }
}
