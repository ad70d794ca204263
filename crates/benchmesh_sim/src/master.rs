//! Scripted master node.
//!
//! Owns the authoritative cluster state, serves definition fetches, applies
//! node-state reports to the job entries, and publishes a
//! [`ClusterChangedEvent`] for every state it applies. Phase changes are
//! driven by the caller.

use crate::network::{SimNetwork, SimTransport};
use async_trait::async_trait;
use benchmesh_cluster::{
    actions, BenchmarkMetadata, ClusterChangedEvent, ClusterState, DefinitionResponse, JobEntry,
    Membership, NodeStateUpdate, RemoteError, RequestHandler, StatusRequest, StatusResponse,
    Transport, TransportError, TransportRequest, TransportResponse,
};
use benchmesh_core::{JobId, NodeId, NodeState, Phase};
use benchmesh_runtime::BenchmarkDefinition;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 1024;

struct MasterInner {
    node_id: NodeId,
    state: Mutex<ClusterState>,
    definitions: Mutex<HashMap<JobId, BenchmarkDefinition>>,
    updates: Mutex<Vec<NodeStateUpdate>>,
    reject_reports: AtomicBool,
    events: broadcast::Sender<ClusterChangedEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MasterInner {
    fn publish(&self, source: &str, update: impl FnOnce(&ClusterState) -> ClusterState) {
        let event = {
            let mut state = lock(&self.state);
            let next = update(&state);
            let previous = std::mem::replace(&mut *state, next.clone());
            ClusterChangedEvent::new(source, next, previous)
        };
        tracing::debug!(
            source,
            version = event.state.version,
            metadata_version = event.state.metadata_version,
            "publishing cluster state"
        );
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn update_entry(&self, source: &str, job_id: &JobId, update: impl FnOnce(&JobEntry) -> JobEntry) {
        self.publish(source, |state| {
            let metadata = state.benchmarks().cloned().unwrap_or_default();
            match metadata.entry(job_id) {
                Some(entry) => state.with_benchmarks(metadata.with_entry(update(entry))),
                None => state.clone(),
            }
        });
    }

    fn apply_report(&self, update: &NodeStateUpdate) {
        let current = lock(&self.state)
            .benchmarks()
            .and_then(|m| m.entry(&update.job_id))
            .and_then(|e| e.node_state(&update.node_id));
        match current {
            Some(state) if state == update.state => {}
            Some(_) => self.update_entry("node-state-update", &update.job_id, |entry| {
                entry.with_node_state(update.node_id.clone(), update.state)
            }),
            None => tracing::warn!(
                job_id = %update.job_id,
                node_id = %update.node_id,
                "report for unknown benchmark or unassigned node"
            ),
        }
    }
}

fn unexpected(request: &TransportRequest) -> RemoteError {
    RemoteError::IllegalState(format!("unexpected {} request", request.action()))
}

struct DefinitionHandler(Weak<MasterInner>);

#[async_trait]
impl RequestHandler for DefinitionHandler {
    async fn handle(&self, request: TransportRequest) -> Result<TransportResponse, RemoteError> {
        let master = self
            .0
            .upgrade()
            .ok_or_else(|| RemoteError::Failed("master stopped".to_string()))?;
        let request = match request {
            TransportRequest::Definition(request) => request,
            other => return Err(unexpected(&other)),
        };
        let definition = lock(&master.definitions)
            .get(&request.job_id)
            .cloned()
            .ok_or_else(|| RemoteError::Failed(format!("unknown benchmark {}", request.job_id)))?;
        Ok(TransportResponse::Definition(DefinitionResponse {
            job_id: request.job_id,
            node_id: request.node_id,
            definition,
        }))
    }
}

struct NodeStateHandler(Weak<MasterInner>);

#[async_trait]
impl RequestHandler for NodeStateHandler {
    async fn handle(&self, request: TransportRequest) -> Result<TransportResponse, RemoteError> {
        let master = self
            .0
            .upgrade()
            .ok_or_else(|| RemoteError::Failed("master stopped".to_string()))?;
        let update = match request {
            TransportRequest::NodeState(update) => update,
            other => return Err(unexpected(&other)),
        };
        lock(&master.updates).push(update.clone());
        if master.reject_reports.load(Ordering::SeqCst) {
            return Err(RemoteError::Failed("node-state update rejected".to_string()));
        }
        master.apply_report(&update);
        Ok(TransportResponse::Ack)
    }
}

/// Master node of a simulated cluster
#[derive(Clone)]
pub struct SimMaster {
    inner: Arc<MasterInner>,
    transport: Arc<SimTransport>,
}

impl SimMaster {
    /// Join a network as the master
    ///
    /// `membership` is the initial cluster membership; the master does not
    /// elect itself, so a membership without a master models an election in
    /// progress.
    #[must_use]
    pub fn new(network: &SimNetwork, node_id: NodeId, membership: Membership) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Arc::new(MasterInner {
            node_id: node_id.clone(),
            state: Mutex::new(ClusterState::new(membership)),
            definitions: Mutex::new(HashMap::new()),
            updates: Mutex::new(Vec::new()),
            reject_reports: AtomicBool::new(false),
            events,
        });
        let transport = network.transport(node_id);
        transport.register_handler(
            actions::DEFINITION,
            Arc::new(DefinitionHandler(Arc::downgrade(&inner))),
        );
        transport.register_handler(
            actions::NODE_STATE,
            Arc::new(NodeStateHandler(Arc::downgrade(&inner))),
        );
        Self { inner, transport }
    }

    /// Master node ID
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.inner.node_id
    }

    /// Receive every event published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClusterChangedEvent> {
        self.inner.events.subscribe()
    }

    /// Current cluster state
    #[must_use]
    pub fn state(&self) -> ClusterState {
        lock(&self.inner.state).clone()
    }

    /// Current entry of a benchmark
    #[must_use]
    pub fn entry(&self, job_id: &JobId) -> Option<JobEntry> {
        lock(&self.inner.state)
            .benchmarks()
            .and_then(|m| m.entry(job_id))
            .cloned()
    }

    /// Every node-state report received, including rejected ones
    #[must_use]
    pub fn updates(&self) -> Vec<NodeStateUpdate> {
        lock(&self.inner.updates).clone()
    }

    /// Reports received for one benchmark and node with a given state
    #[must_use]
    pub fn reports(&self, job_id: &JobId, node_id: &NodeId, state: NodeState) -> usize {
        lock(&self.inner.updates)
            .iter()
            .filter(|u| &u.job_id == job_id && &u.node_id == node_id && u.state == state)
            .count()
    }

    /// Reject node-state reports with a remote failure
    pub fn reject_reports(&self, reject: bool) {
        self.inner.reject_reports.store(reject, Ordering::SeqCst);
    }

    /// Publish new membership, metadata untouched
    pub fn publish_membership(&self, membership: Membership) {
        self.inner
            .publish("membership", |state| state.with_membership(membership));
    }

    /// Make a definition available for fetching without publishing anything
    pub fn add_definition(&self, definition: BenchmarkDefinition) {
        lock(&self.inner.definitions).insert(definition.job_id.clone(), definition);
    }

    /// Register a benchmark and assign it to `nodes` in the initializing phase
    pub fn submit(&self, definition: BenchmarkDefinition, nodes: impl IntoIterator<Item = NodeId>) {
        let entry = JobEntry::new(definition.job_id.clone(), nodes);
        self.add_definition(definition);
        self.inner.publish("submit", |state| {
            let metadata = state.benchmarks().cloned().unwrap_or_default();
            state.with_benchmarks(metadata.with_entry(entry))
        });
    }

    /// Move a benchmark to another phase
    pub fn set_phase(&self, job_id: &JobId, phase: Phase) {
        self.inner
            .update_entry("phase", job_id, |entry| entry.with_phase(phase));
    }

    /// Move a benchmark to another phase and record every node in `state`
    pub fn transition(&self, job_id: &JobId, phase: Phase, state: NodeState) {
        self.inner.update_entry("phase", job_id, |entry| {
            let mut next = entry.with_all_node_states(state).with_phase(phase);
            // One publication, one version step
            next.version = entry.version + 1;
            next
        });
    }

    /// Record one node's state without a report
    pub fn set_node_state(&self, job_id: &JobId, node_id: NodeId, state: NodeState) {
        self.inner
            .update_entry("node-state", job_id, |entry| entry.with_node_state(node_id, state));
    }

    /// Republish an entry unchanged except for its version
    pub fn touch(&self, job_id: &JobId) {
        self.inner.update_entry("touch", job_id, |entry| {
            let mut next = entry.clone();
            next.version += 1;
            next
        });
    }

    /// Drop a benchmark from the metadata
    pub fn remove(&self, job_id: &JobId) {
        lock(&self.inner.definitions).remove(job_id);
        self.inner.publish("remove", |state| {
            let metadata = state.benchmarks().cloned().unwrap_or_default();
            state.with_benchmarks(metadata.without_entry(job_id))
        });
    }

    /// Replace the whole metadata section
    pub fn publish_metadata(&self, metadata: BenchmarkMetadata) {
        self.inner
            .publish("metadata", |state| state.with_benchmarks(metadata));
    }

    /// Pull a benchmark's status from a node
    ///
    /// # Errors
    ///
    /// Returns error if the round trip fails or the node refuses
    pub async fn request_status(
        &self,
        node_id: &NodeId,
        job_id: &JobId,
    ) -> Result<StatusResponse, TransportError> {
        let request = TransportRequest::Status(StatusRequest {
            job_id: job_id.clone(),
        });
        self.transport
            .send_request(node_id, request)
            .await?
            .into_status()
    }
}

impl std::fmt::Debug for SimMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimMaster")
            .field("node_id", &self.inner.node_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::SimSeed;
    use benchmesh_cluster::{DefinitionRequest, Member};

    fn cluster() -> (SimNetwork, SimMaster) {
        let network = SimNetwork::new(&SimSeed::default());
        let membership = Membership::new(NodeId::from("master"))
            .with_member(Member::new(NodeId::from("master"), "m"))
            .with_member(Member::new(NodeId::from("n1"), "n1").bench())
            .with_master(NodeId::from("master"));
        let master = SimMaster::new(&network, NodeId::from("master"), membership);
        (network, master)
    }

    #[tokio::test]
    async fn test_submit_publishes_entry() {
        let (_network, master) = cluster();
        let mut events = master.subscribe();
        master.submit(BenchmarkDefinition::new(JobId::from("b1")), [NodeId::from("n1")]);

        let event = events.try_recv().unwrap();
        assert!(event.metadata_changed());
        let entry = master.entry(&JobId::from("b1")).unwrap();
        assert_eq!(entry.phase, Phase::Initializing);
        assert_eq!(entry.node_state(&NodeId::from("n1")), Some(NodeState::Initializing));
    }

    #[tokio::test]
    async fn test_serves_definitions() {
        let (network, master) = cluster();
        master.submit(
            BenchmarkDefinition::new(JobId::from("b1")).with_iterations(5),
            [NodeId::from("n1")],
        );
        let node = network.transport(NodeId::from("n1"));
        let request = TransportRequest::Definition(DefinitionRequest {
            job_id: JobId::from("b1"),
            node_id: NodeId::from("n1"),
        });
        let response = node
            .send_request(master.node_id(), request)
            .await
            .unwrap()
            .into_definition()
            .unwrap();
        assert_eq!(response.definition.iterations, 5);

        let unknown = TransportRequest::Definition(DefinitionRequest {
            job_id: JobId::from("b2"),
            node_id: NodeId::from("n1"),
        });
        assert!(node.send_request(master.node_id(), unknown).await.is_err());
    }

    #[tokio::test]
    async fn test_reports_update_entry_once() {
        let (network, master) = cluster();
        master.submit(BenchmarkDefinition::new(JobId::from("b1")), [NodeId::from("n1")]);
        let mut events = master.subscribe();
        let node = network.transport(NodeId::from("n1"));
        let report = TransportRequest::NodeState(NodeStateUpdate {
            job_id: JobId::from("b1"),
            node_id: NodeId::from("n1"),
            state: NodeState::Ready,
        });

        node.send_request(master.node_id(), report.clone()).await.unwrap();
        node.send_request(master.node_id(), report).await.unwrap();

        assert!(events.try_recv().is_ok());
        assert!(events.try_recv().is_err(), "duplicate report publishes nothing");
        assert_eq!(
            master.entry(&JobId::from("b1")).unwrap().node_state(&NodeId::from("n1")),
            Some(NodeState::Ready)
        );
        assert_eq!(master.reports(&JobId::from("b1"), &NodeId::from("n1"), NodeState::Ready), 2);
    }

    #[tokio::test]
    async fn test_rejected_reports() {
        let (network, master) = cluster();
        master.submit(BenchmarkDefinition::new(JobId::from("b1")), [NodeId::from("n1")]);
        master.reject_reports(true);
        let node = network.transport(NodeId::from("n1"));
        let report = TransportRequest::NodeState(NodeStateUpdate {
            job_id: JobId::from("b1"),
            node_id: NodeId::from("n1"),
            state: NodeState::Ready,
        });
        assert!(node.send_request(master.node_id(), report).await.is_err());
        assert_eq!(
            master.entry(&JobId::from("b1")).unwrap().node_state(&NodeId::from("n1")),
            Some(NodeState::Initializing)
        );
    }

    #[tokio::test]
    async fn test_transition_is_one_version() {
        let (_network, master) = cluster();
        master.submit(BenchmarkDefinition::new(JobId::from("b1")), [NodeId::from("n1")]);
        let before = master.entry(&JobId::from("b1")).unwrap().version;
        master.transition(&JobId::from("b1"), Phase::Running, NodeState::Running);
        let after = master.entry(&JobId::from("b1")).unwrap();
        assert_eq!(after.version, before + 1);
        assert_eq!(after.phase, Phase::Running);
        assert!(after.all_nodes_in(NodeState::Running));
    }

    #[tokio::test]
    async fn test_remove() {
        let (_network, master) = cluster();
        master.submit(BenchmarkDefinition::new(JobId::from("b1")), [NodeId::from("n1")]);
        master.remove(&JobId::from("b1"));
        assert!(master.entry(&JobId::from("b1")).is_none());
        assert_eq!(master.state().benchmarks().map(BenchmarkMetadata::len), Some(0));
    }
}
