//! Benchmark section of the replicated cluster metadata.
//!
//! Entries are immutable snapshots: every update produces a new entry with a
//! higher version, and consumers diff consecutive snapshots by id and
//! version to find what changed.

use benchmesh_core::{JobId, NodeId, NodeState, Phase};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coordinator-visible record of one benchmark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEntry {
    /// Benchmark ID
    pub job_id: JobId,
    /// Phase declared by the coordinator
    pub phase: Phase,
    /// State of every assigned node
    pub node_states: BTreeMap<NodeId, NodeState>,
    /// Entry version, bumped on every update
    pub version: u64,
}

impl JobEntry {
    /// Create an entry in the initializing phase, assigned to `nodes`
    #[must_use]
    pub fn new(job_id: JobId, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            job_id,
            phase: Phase::Initializing,
            node_states: nodes
                .into_iter()
                .map(|node| (node, NodeState::Initializing))
                .collect(),
            version: 1,
        }
    }

    /// New version of this entry in another phase
    #[must_use]
    pub fn with_phase(&self, phase: Phase) -> Self {
        let mut next = self.clone();
        next.phase = phase;
        next.version += 1;
        next
    }

    /// New version of this entry with one node's state replaced
    #[must_use]
    pub fn with_node_state(&self, node_id: NodeId, state: NodeState) -> Self {
        let mut next = self.clone();
        next.node_states.insert(node_id, state);
        next.version += 1;
        next
    }

    /// New version of this entry with every node set to `state`
    #[must_use]
    pub fn with_all_node_states(&self, state: NodeState) -> Self {
        let mut next = self.clone();
        for value in next.node_states.values_mut() {
            *value = state;
        }
        next.version += 1;
        next
    }

    /// State recorded for a node, `None` if the node is not assigned
    #[must_use]
    pub fn node_state(&self, node_id: &NodeId) -> Option<NodeState> {
        self.node_states.get(node_id).copied()
    }

    /// Whether the benchmark is assigned to a node
    #[must_use]
    pub fn is_assigned_to(&self, node_id: &NodeId) -> bool {
        self.node_states.contains_key(node_id)
    }

    /// Whether every assigned node is in `state`
    #[must_use]
    pub fn all_nodes_in(&self, state: NodeState) -> bool {
        self.node_states.values().all(|s| *s == state)
    }
}

/// Collection of benchmark entries carried in cluster metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkMetadata {
    /// Entries by benchmark ID
    entries: BTreeMap<JobId, JobEntry>,
}

impl BenchmarkMetadata {
    /// Name of the custom metadata section
    pub const TYPE: &'static str = "benchmark";

    /// Create empty metadata
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of this metadata with an entry added or replaced
    #[must_use]
    pub fn with_entry(&self, entry: JobEntry) -> Self {
        let mut next = self.clone();
        next.entries.insert(entry.job_id.clone(), entry);
        next
    }

    /// Copy of this metadata with an entry removed
    #[must_use]
    pub fn without_entry(&self, job_id: &JobId) -> Self {
        let mut next = self.clone();
        next.entries.remove(job_id);
        next
    }

    /// Get an entry
    #[must_use]
    pub fn entry(&self, job_id: &JobId) -> Option<&JobEntry> {
        self.entries.get(job_id)
    }

    /// Iterate entries in ID order
    pub fn entries(&self) -> impl Iterator<Item = &JobEntry> {
        self.entries.values()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries of `current` that are absent from `previous` or carry a
    /// different version there
    #[must_use]
    pub fn added_or_changed<'a>(
        previous: Option<&BenchmarkMetadata>,
        current: &'a BenchmarkMetadata,
    ) -> Vec<&'a JobEntry> {
        current
            .entries()
            .filter(|entry| {
                previous
                    .and_then(|prev| prev.entry(&entry.job_id))
                    .is_none_or(|old| old.version != entry.version)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes() -> Vec<NodeId> {
        vec![NodeId::from("n1"), NodeId::from("n2")]
    }

    #[test]
    fn test_entry_new() {
        let entry = JobEntry::new(JobId::from("b1"), nodes());
        assert_eq!(entry.phase, Phase::Initializing);
        assert_eq!(entry.version, 1);
        assert_eq!(entry.node_state(&NodeId::from("n1")), Some(NodeState::Initializing));
        assert!(entry.is_assigned_to(&NodeId::from("n2")));
        assert!(!entry.is_assigned_to(&NodeId::from("n3")));
    }

    #[test]
    fn test_entry_updates_bump_version() {
        let entry = JobEntry::new(JobId::from("b1"), nodes());
        let next = entry.with_phase(Phase::Running);
        assert_eq!(next.version, 2);
        assert_eq!(entry.phase, Phase::Initializing);

        let next = next.with_node_state(NodeId::from("n1"), NodeState::Ready);
        assert_eq!(next.version, 3);
        assert!(!next.all_nodes_in(NodeState::Ready));

        let next = next.with_all_node_states(NodeState::Ready);
        assert!(next.all_nodes_in(NodeState::Ready));
    }

    #[test]
    fn test_added_or_changed_without_previous() {
        let meta = BenchmarkMetadata::new()
            .with_entry(JobEntry::new(JobId::from("b1"), nodes()))
            .with_entry(JobEntry::new(JobId::from("b2"), nodes()));
        assert_eq!(BenchmarkMetadata::added_or_changed(None, &meta).len(), 2);
    }

    #[test]
    fn test_added_or_changed_by_version() {
        let b1 = JobEntry::new(JobId::from("b1"), nodes());
        let b2 = JobEntry::new(JobId::from("b2"), nodes());
        let prev = BenchmarkMetadata::new().with_entry(b1.clone()).with_entry(b2.clone());
        let cur = prev.with_entry(b2.with_phase(Phase::Running));

        let changed = BenchmarkMetadata::added_or_changed(Some(&prev), &cur);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].job_id, JobId::from("b2"));
        assert_eq!(changed[0].phase, Phase::Running);
    }

    #[test]
    fn test_removed_entries_are_not_reported() {
        let b1 = JobEntry::new(JobId::from("b1"), nodes());
        let prev = BenchmarkMetadata::new().with_entry(b1);
        let cur = prev.without_entry(&JobId::from("b1"));
        assert!(BenchmarkMetadata::added_or_changed(Some(&prev), &cur).is_empty());
        assert!(cur.is_empty());
    }

    #[test]
    fn test_metadata_serde() {
        let meta = BenchmarkMetadata::new().with_entry(JobEntry::new(JobId::from("b1"), nodes()));
        let json = serde_json::to_string(&meta).unwrap();
        let back: BenchmarkMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}
