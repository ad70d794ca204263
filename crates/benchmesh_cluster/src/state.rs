//! Cluster-state snapshots and the change events delivered to services.

use crate::{membership::Membership, metadata::BenchmarkMetadata};
use benchmesh_core::NodeId;
use serde::{Deserialize, Serialize};

/// Immutable snapshot of cluster state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterState {
    /// State version, bumped on every publication
    pub version: u64,
    /// Membership as seen by the receiving node
    pub membership: Membership,
    /// Metadata version, bumped only when metadata changes
    pub metadata_version: u64,
    /// Benchmark metadata section, absent until the first benchmark
    pub benchmarks: Option<BenchmarkMetadata>,
}

impl ClusterState {
    /// Create the initial state with no metadata
    #[must_use]
    pub fn new(membership: Membership) -> Self {
        Self {
            version: 0,
            membership,
            metadata_version: 0,
            benchmarks: None,
        }
    }

    /// Next state with replaced benchmark metadata
    #[must_use]
    pub fn with_benchmarks(&self, benchmarks: BenchmarkMetadata) -> Self {
        Self {
            version: self.version + 1,
            membership: self.membership.clone(),
            metadata_version: self.metadata_version + 1,
            benchmarks: Some(benchmarks),
        }
    }

    /// Next state with replaced membership; metadata is untouched
    #[must_use]
    pub fn with_membership(&self, membership: Membership) -> Self {
        Self {
            version: self.version + 1,
            membership,
            metadata_version: self.metadata_version,
            benchmarks: self.benchmarks.clone(),
        }
    }

    /// Same state delivered to another node
    #[must_use]
    pub fn for_node(&self, node_id: NodeId) -> Self {
        Self {
            membership: self.membership.for_node(node_id),
            ..self.clone()
        }
    }

    /// Benchmark metadata section
    #[must_use]
    pub fn benchmarks(&self) -> Option<&BenchmarkMetadata> {
        self.benchmarks.as_ref()
    }
}

/// Change from one published state to the next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterChangedEvent {
    /// What triggered the publication
    pub source: String,
    /// Newly applied state
    pub state: ClusterState,
    /// State applied before it
    pub previous_state: ClusterState,
}

impl ClusterChangedEvent {
    /// Create a change event
    #[must_use]
    pub fn new(source: impl Into<String>, state: ClusterState, previous_state: ClusterState) -> Self {
        Self {
            source: source.into(),
            state,
            previous_state,
        }
    }

    /// Whether metadata differs between the two states
    #[must_use]
    pub fn metadata_changed(&self) -> bool {
        self.state.metadata_version != self.previous_state.metadata_version
    }

    /// Whether the elected master changed
    #[must_use]
    pub fn master_changed(&self) -> bool {
        self.state.membership.master_node_id() != self.previous_state.membership.master_node_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{membership::Member, metadata::JobEntry};
    use benchmesh_core::JobId;

    fn initial() -> ClusterState {
        let membership = Membership::new(NodeId::from("n1"))
            .with_member(Member::new(NodeId::from("n1"), "addr").bench());
        ClusterState::new(membership)
    }

    #[test]
    fn test_with_benchmarks_bumps_versions() {
        let state = initial();
        let next = state.with_benchmarks(
            BenchmarkMetadata::new().with_entry(JobEntry::new(JobId::from("b1"), [NodeId::from("n1")])),
        );
        assert_eq!(next.version, 1);
        assert_eq!(next.metadata_version, 1);
        assert_eq!(next.benchmarks().map(BenchmarkMetadata::len), Some(1));
    }

    #[test]
    fn test_metadata_changed() {
        let state = initial();
        let next = state.with_benchmarks(BenchmarkMetadata::new());
        assert!(ClusterChangedEvent::new("test", next.clone(), state.clone()).metadata_changed());

        let membership_only = next.with_membership(next.membership.clone().with_master(NodeId::from("m")));
        let event = ClusterChangedEvent::new("test", membership_only, next);
        assert!(!event.metadata_changed());
        assert!(event.master_changed());
    }

    #[test]
    fn test_for_node() {
        let state = initial().for_node(NodeId::from("n2"));
        assert_eq!(state.membership.local_node_id(), &NodeId::from("n2"));
        assert!(!state.membership.is_local_benchmark_node());
    }
}
