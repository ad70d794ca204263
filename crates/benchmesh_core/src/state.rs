//! Lifecycle vocabularies shared between the coordinator and workers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinator-declared phase of a benchmark entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Workers are fetching the definition and creating the workload
    Initializing,
    /// Workers should start executing
    Running,
    /// Paused workers should continue
    Resuming,
    /// Running workers should pause
    Paused,
    /// Workers should abort
    Aborted,
    /// The benchmark is finished and local state may be released
    Completed,
    /// A phase this node does not understand
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initializing => "INITIALIZING",
            Self::Running => "RUNNING",
            Self::Resuming => "RESUMING",
            Self::Paused => "PAUSED",
            Self::Aborted => "ABORTED",
            Self::Completed => "COMPLETED",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Per-node state of a benchmark as recorded by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    /// Node was assigned and has not reported yet
    Initializing,
    /// Definition received and workload created
    Ready,
    /// Executing
    Running,
    /// Execution paused
    Paused,
    /// Execution finished
    Completed,
    /// Node gave up on the benchmark
    Failed,
    /// Execution aborted
    Aborted,
}

impl NodeState {
    /// Whether no further transitions are expected for this node
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Failed)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initializing => "INITIALIZING",
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(NodeState::Completed.is_terminal());
        assert!(NodeState::Aborted.is_terminal());
        assert!(NodeState::Failed.is_terminal());
        assert!(!NodeState::Running.is_terminal());
        assert!(!NodeState::Ready.is_terminal());
    }

    #[test]
    fn test_phase_wire_names() {
        assert_eq!(serde_json::to_string(&Phase::Resuming).unwrap(), "\"RESUMING\"");
        let phase: Phase = serde_json::from_str("\"PAUSED\"").unwrap();
        assert_eq!(phase, Phase::Paused);
    }

    #[test]
    fn test_unrecognized_phase_decodes_as_unknown() {
        let phase: Phase = serde_json::from_str("\"SUSPENDED\"").unwrap();
        assert_eq!(phase, Phase::Unknown);
    }

    #[test]
    fn test_display_matches_wire() {
        assert_eq!(NodeState::Ready.to_string(), "READY");
        assert_eq!(Phase::Completed.to_string(), "COMPLETED");
    }
}
