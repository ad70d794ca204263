//! Phase decisions.
//!
//! Maps the coordinator-declared phase of an entry and this node's recorded
//! state to the action the node should take. Pure: guard checks and side
//! effects happen when the decision is applied.

use crate::error::{ExecutorError, ExecutorResult};
use benchmesh_core::{JobId, NodeState, Phase};

/// What the node should do for one changed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Create local state and fetch the definition
    Initialize,
    /// Start execution if the guard allows it
    Start,
    /// Resume execution if the guard allows it
    Resume,
    /// Pause execution
    Pause,
    /// Abort execution if the guard allows it
    Abort,
    /// Clear backend state and drop local state
    Clear,
    /// Nothing to do
    Skip,
}

/// Decide the action for an entry
///
/// `local` is the state the coordinator recorded for this node and
/// `has_state` whether the registry holds local state for the benchmark.
///
/// # Errors
///
/// Returns [`ExecutorError::IllegalPhase`] for phases this node does not
/// understand.
pub fn decide(
    job_id: &JobId,
    phase: Phase,
    local: NodeState,
    has_state: bool,
) -> ExecutorResult<Decision> {
    let decision = match phase {
        Phase::Initializing if !has_state && local == NodeState::Initializing => Decision::Initialize,
        Phase::Running if has_state && local == NodeState::Running => Decision::Start,
        Phase::Resuming if has_state && local == NodeState::Paused => Decision::Resume,
        Phase::Paused if has_state && matches!(local, NodeState::Running | NodeState::Ready) => {
            Decision::Pause
        }
        Phase::Aborted if has_state && !local.is_terminal() => Decision::Abort,
        Phase::Completed if has_state => Decision::Clear,
        Phase::Unknown => {
            return Err(ExecutorError::IllegalPhase {
                job_id: job_id.clone(),
                phase,
            })
        }
        _ => Decision::Skip,
    };
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [NodeState; 7] = [
        NodeState::Initializing,
        NodeState::Ready,
        NodeState::Running,
        NodeState::Paused,
        NodeState::Completed,
        NodeState::Failed,
        NodeState::Aborted,
    ];

    fn id() -> JobId {
        JobId::from("b1")
    }

    #[test]
    fn test_initializing() {
        assert_eq!(
            decide(&id(), Phase::Initializing, NodeState::Initializing, false),
            Ok(Decision::Initialize)
        );
        // Already initialized here
        assert_eq!(
            decide(&id(), Phase::Initializing, NodeState::Initializing, true),
            Ok(Decision::Skip)
        );
        // Already reported
        assert_eq!(
            decide(&id(), Phase::Initializing, NodeState::Ready, false),
            Ok(Decision::Skip)
        );
    }

    #[test]
    fn test_running() {
        assert_eq!(decide(&id(), Phase::Running, NodeState::Running, true), Ok(Decision::Start));
        assert_eq!(decide(&id(), Phase::Running, NodeState::Running, false), Ok(Decision::Skip));
        assert_eq!(decide(&id(), Phase::Running, NodeState::Ready, true), Ok(Decision::Skip));
    }

    #[test]
    fn test_resuming() {
        assert_eq!(decide(&id(), Phase::Resuming, NodeState::Paused, true), Ok(Decision::Resume));
        assert_eq!(decide(&id(), Phase::Resuming, NodeState::Running, true), Ok(Decision::Skip));
        assert_eq!(decide(&id(), Phase::Resuming, NodeState::Paused, false), Ok(Decision::Skip));
    }

    #[test]
    fn test_paused() {
        assert_eq!(decide(&id(), Phase::Paused, NodeState::Running, true), Ok(Decision::Pause));
        assert_eq!(decide(&id(), Phase::Paused, NodeState::Ready, true), Ok(Decision::Pause));
        assert_eq!(decide(&id(), Phase::Paused, NodeState::Paused, true), Ok(Decision::Skip));
        assert_eq!(decide(&id(), Phase::Paused, NodeState::Running, false), Ok(Decision::Skip));
    }

    #[test]
    fn test_aborted_skips_terminal_states() {
        for state in ALL_STATES {
            let expected = if state.is_terminal() {
                Decision::Skip
            } else {
                Decision::Abort
            };
            assert_eq!(decide(&id(), Phase::Aborted, state, true), Ok(expected), "{state}");
        }
        assert_eq!(decide(&id(), Phase::Aborted, NodeState::Running, false), Ok(Decision::Skip));
    }

    #[test]
    fn test_completed_clears_whatever_the_node_state() {
        for state in ALL_STATES {
            assert_eq!(decide(&id(), Phase::Completed, state, true), Ok(Decision::Clear));
            assert_eq!(decide(&id(), Phase::Completed, state, false), Ok(Decision::Skip));
        }
    }

    #[test]
    fn test_unknown_phase() {
        for has_state in [true, false] {
            let err = decide(&id(), Phase::Unknown, NodeState::Running, has_state).unwrap_err();
            assert!(matches!(err, ExecutorError::IllegalPhase { .. }));
        }
    }
}
