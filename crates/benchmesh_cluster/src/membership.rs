//! Cluster membership as seen in one cluster-state snapshot.

use benchmesh_core::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Capability advertised by nodes that execute benchmarks
pub const BENCH_CAPABILITY: &str = "bench";

/// Member state in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberState {
    /// Member is joining
    Joining,
    /// Member is active
    Active,
    /// Member is leaving
    Leaving,
    /// Member is suspected to be down
    Suspected,
}

/// Cluster member information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Member node ID
    pub node_id: NodeId,
    /// Member state
    pub state: MemberState,
    /// Member address
    pub address: String,
    /// Member capabilities
    pub capabilities: Vec<String>,
}

impl Member {
    /// Create a new active member
    #[must_use]
    pub fn new(node_id: NodeId, address: impl Into<String>) -> Self {
        Self {
            node_id,
            state: MemberState::Active,
            address: address.into(),
            capabilities: Vec::new(),
        }
    }

    /// Set member state
    #[must_use]
    pub fn with_state(mut self, state: MemberState) -> Self {
        self.state = state;
        self
    }

    /// Add a capability
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Mark this member as a benchmark executor
    #[must_use]
    pub fn bench(self) -> Self {
        self.with_capability(BENCH_CAPABILITY)
    }

    /// Check if member is active
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.state, MemberState::Active)
    }

    /// Check if member executes benchmarks
    #[must_use]
    pub fn is_benchmark_node(&self) -> bool {
        self.capabilities.iter().any(|c| c == BENCH_CAPABILITY)
    }
}

/// Membership snapshot from the perspective of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Node observing this snapshot
    local_node_id: NodeId,
    /// Elected coordinator, if any
    master_node_id: Option<NodeId>,
    /// Known members
    members: BTreeMap<NodeId, Member>,
}

impl Membership {
    /// Create a membership snapshot for `local_node_id` with no members
    #[must_use]
    pub fn new(local_node_id: NodeId) -> Self {
        Self {
            local_node_id,
            master_node_id: None,
            members: BTreeMap::new(),
        }
    }

    /// Add or replace a member
    #[must_use]
    pub fn with_member(mut self, member: Member) -> Self {
        self.members.insert(member.node_id.clone(), member);
        self
    }

    /// Set the elected master
    #[must_use]
    pub fn with_master(mut self, master: NodeId) -> Self {
        self.master_node_id = Some(master);
        self
    }

    /// Same membership seen from another node
    #[must_use]
    pub fn for_node(&self, local_node_id: NodeId) -> Self {
        Self {
            local_node_id,
            ..self.clone()
        }
    }

    /// Local node ID
    #[must_use]
    pub fn local_node_id(&self) -> &NodeId {
        &self.local_node_id
    }

    /// Local member, if it has joined
    #[must_use]
    pub fn local_node(&self) -> Option<&Member> {
        self.members.get(&self.local_node_id)
    }

    /// Elected master
    #[must_use]
    pub fn master_node_id(&self) -> Option<&NodeId> {
        self.master_node_id.as_ref()
    }

    /// Whether the local node is the elected master
    #[must_use]
    pub fn is_local_master(&self) -> bool {
        self.master_node_id.as_ref() == Some(&self.local_node_id)
    }

    /// Whether the local node executes benchmarks
    #[must_use]
    pub fn is_local_benchmark_node(&self) -> bool {
        self.local_node().is_some_and(Member::is_benchmark_node)
    }

    /// Get a member by ID
    #[must_use]
    pub fn get_member(&self, node_id: &NodeId) -> Option<&Member> {
        self.members.get(node_id)
    }

    /// All members
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Active members that execute benchmarks
    #[must_use]
    pub fn benchmark_nodes(&self) -> Vec<&Member> {
        self.members
            .values()
            .filter(|m| m.is_active() && m.is_benchmark_node())
            .collect()
    }

    /// Get member count
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Membership {
        Membership::new(NodeId::from("n1"))
            .with_member(Member::new(NodeId::from("m"), "127.0.0.1:9300"))
            .with_member(Member::new(NodeId::from("n1"), "127.0.0.1:9301").bench())
            .with_member(
                Member::new(NodeId::from("n2"), "127.0.0.1:9302")
                    .bench()
                    .with_state(MemberState::Suspected),
            )
            .with_master(NodeId::from("m"))
    }

    #[test]
    fn test_member_new() {
        let member = Member::new(NodeId::from("n1"), "addr");
        assert!(member.is_active());
        assert!(!member.is_benchmark_node());
        assert!(member.bench().is_benchmark_node());
    }

    #[test]
    fn test_local_benchmark_node() {
        let membership = sample();
        assert!(membership.is_local_benchmark_node());
        assert!(!membership.for_node(NodeId::from("m")).is_local_benchmark_node());
        assert!(!membership.for_node(NodeId::from("absent")).is_local_benchmark_node());
    }

    #[test]
    fn test_master() {
        let membership = sample();
        assert_eq!(membership.master_node_id(), Some(&NodeId::from("m")));
        assert!(!membership.is_local_master());
        assert!(membership.for_node(NodeId::from("m")).is_local_master());
    }

    #[test]
    fn test_benchmark_nodes_only_active() {
        let membership = sample();
        let nodes = membership.benchmark_nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node_id, NodeId::from("n1"));
        assert_eq!(membership.member_count(), 3);
    }
}
