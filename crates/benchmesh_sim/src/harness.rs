//! Lifecycle harness for simulated clusters.
//!
//! The harness plays the coordinator: it submits a benchmark, waits for
//! every node to report, and advances the phase from INITIALIZING through
//! RUNNING to COMPLETED (or ABORTED when a node does not get ready). Nodes
//! are anything implementing [`SimNode`], so the harness stays independent
//! of the executor it drives.

use crate::backend::SimBackend;
use crate::master::SimMaster;
use crate::network::{SimNetwork, SimTransport};
use crate::seed::SimSeed;
use async_trait::async_trait;
use benchmesh_cluster::{ClusterChangedEvent, Member, Membership};
use benchmesh_core::{JobId, NodeId, NodeState, Phase};
use benchmesh_runtime::BenchmarkDefinition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};

/// A cluster node driven by the harness
#[async_trait]
pub trait SimNode: Send + Sync {
    /// Apply a published cluster state
    async fn cluster_changed(&self, event: &ClusterChangedEvent);

    /// Wait until all work triggered so far has finished
    async fn quiesce(&self);

    /// Number of benchmarks with local state
    async fn job_count(&self) -> usize;
}

/// Simulation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    /// The cluster kept publishing after the round limit
    #[error("Cluster did not settle after {0} rounds")]
    Unsettled(usize),

    /// The master lost track of the benchmark
    #[error("Benchmark {0} vanished from metadata")]
    MissingEntry(JobId),

    /// A node could not be built
    #[error("Failed to set up node {0}")]
    NodeSetup(String),

    /// Invalid simulation config
    #[error("Invalid simulation config: {0}")]
    InvalidConfig(String),
}

/// Simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for every random decision
    pub seed: SimSeed,
    /// Number of benchmark nodes
    pub nodes: usize,
    /// Message loss probability
    pub loss: f64,
    /// Iterations of the simulated benchmark
    pub iterations: u64,
    /// Concurrency of the simulated benchmark
    pub concurrency: usize,
    /// Delivery rounds before giving up on a phase
    pub max_rounds: usize,
}

impl SimConfig {
    /// Create a config with the given seed
    #[must_use]
    pub fn new(seed: SimSeed) -> Self {
        Self {
            seed,
            nodes: 3,
            loss: 0.0,
            iterations: 100,
            concurrency: 4,
            max_rounds: 64,
        }
    }

    /// Set the node count
    #[must_use]
    pub fn with_nodes(mut self, nodes: usize) -> Self {
        self.nodes = nodes;
        self
    }

    /// Set the loss probability
    #[must_use]
    pub fn with_loss(mut self, loss: f64) -> Self {
        self.loss = loss;
        self
    }

    /// Set the benchmark iterations
    #[must_use]
    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    /// Check the config
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range
    pub fn validate(&self) -> Result<(), SimError> {
        if self.nodes == 0 {
            return Err(SimError::InvalidConfig("at least one node is required".to_string()));
        }
        if !(0.0..=1.0).contains(&self.loss) {
            return Err(SimError::InvalidConfig(format!(
                "loss {} is not a probability",
                self.loss
            )));
        }
        if self.max_rounds == 0 {
            return Err(SimError::InvalidConfig("max_rounds must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::new(SimSeed::default())
    }
}

/// Outcome of one simulated lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimReport {
    /// Benchmark driven
    pub job_id: JobId,
    /// Last phase before cleanup, COMPLETED when every node finished
    pub outcome: Phase,
    /// Node states before cleanup
    pub node_states: BTreeMap<NodeId, NodeState>,
    /// Messages sent, by action
    pub messages: BTreeMap<String, usize>,
    /// Messages the network dropped
    pub dropped: usize,
    /// Benchmarks still holding local state after cleanup, summed over nodes
    pub leftover_jobs: usize,
}

impl SimReport {
    /// Whether every node completed the benchmark
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome == Phase::Completed
            && self.node_states.values().all(|s| *s == NodeState::Completed)
    }
}

struct Attached<N> {
    node: N,
    events: broadcast::Receiver<ClusterChangedEvent>,
}

/// Master, network, and nodes of one simulated cluster
pub struct SimHarness<N> {
    config: SimConfig,
    network: SimNetwork,
    master: SimMaster,
    node_ids: Vec<NodeId>,
    backends: BTreeMap<NodeId, Arc<SimBackend>>,
    nodes: Vec<Attached<N>>,
}

impl<N: SimNode> SimHarness<N> {
    /// Build a cluster of `config.nodes` benchmark nodes and one master
    ///
    /// `build` creates each node from its ID, transport, and backend.
    ///
    /// # Errors
    ///
    /// Returns error if the config is invalid or a node cannot be built
    pub fn new<F, E>(config: SimConfig, mut build: F) -> Result<Self, SimError>
    where
        F: FnMut(NodeId, Arc<SimTransport>, Arc<SimBackend>) -> Result<N, E>,
        E: std::fmt::Display,
    {
        config.validate()?;
        let network = SimNetwork::new(&config.seed);
        let master_id = NodeId::from("master");
        let node_ids: Vec<NodeId> = (1..=config.nodes)
            .map(|i| NodeId::new(format!("node-{i}")))
            .collect();

        let membership = node_ids.iter().fold(
            Membership::new(master_id.clone())
                .with_member(Member::new(master_id.clone(), "sim://master"))
                .with_master(master_id.clone()),
            |membership, id| membership.with_member(Member::new(id.clone(), format!("sim://{id}")).bench()),
        );
        let master = SimMaster::new(&network, master_id, membership);

        let mut backends = BTreeMap::new();
        let mut nodes = Vec::with_capacity(node_ids.len());
        for id in &node_ids {
            let backend = Arc::new(SimBackend::new());
            backends.insert(id.clone(), Arc::clone(&backend));
            let node = build(id.clone(), network.transport(id.clone()), backend)
                .map_err(|e| SimError::NodeSetup(format!("{id}: {e}")))?;
            nodes.push(Attached {
                node,
                events: master.subscribe(),
            });
        }

        Ok(Self {
            config,
            network,
            master,
            node_ids,
            backends,
            nodes,
        })
    }

    /// The master
    #[must_use]
    pub fn master(&self) -> &SimMaster {
        &self.master
    }

    /// The network
    #[must_use]
    pub fn network(&self) -> &SimNetwork {
        &self.network
    }

    /// Benchmark node IDs
    #[must_use]
    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    /// Backend of a node
    #[must_use]
    pub fn backend(&self, node_id: &NodeId) -> Option<&Arc<SimBackend>> {
        self.backends.get(node_id)
    }

    /// Deliver published events until the cluster stops changing
    ///
    /// # Errors
    ///
    /// Returns error if the cluster is still publishing after
    /// `max_rounds` rounds
    pub async fn settle(&mut self) -> Result<(), SimError> {
        for _ in 0..self.config.max_rounds {
            let mut delivered = 0;
            for attached in &mut self.nodes {
                loop {
                    match attached.events.try_recv() {
                        Ok(event) => {
                            attached.node.cluster_changed(&event).await;
                            delivered += 1;
                        }
                        Err(TryRecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "node fell behind the event stream");
                        }
                        Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                    }
                }
                attached.node.quiesce().await;
            }
            if delivered == 0 {
                return Ok(());
            }
        }
        Err(SimError::Unsettled(self.config.max_rounds))
    }

    /// Drive one benchmark through its whole lifecycle
    ///
    /// # Errors
    ///
    /// Returns error if the cluster does not settle
    pub async fn run_lifecycle(&mut self) -> Result<SimReport, SimError> {
        let job_id = JobId::new(format!("bench-{:016x}", self.config.seed.seed));
        let definition = BenchmarkDefinition::new(job_id.clone())
            .with_iterations(self.config.iterations)
            .with_concurrency(self.config.concurrency);

        self.network.set_packet_loss(self.config.loss);
        self.master.submit(definition, self.node_ids.clone());
        self.settle().await?;

        let entry = self
            .master
            .entry(&job_id)
            .ok_or_else(|| SimError::MissingEntry(job_id.clone()))?;
        let outcome = if entry.all_nodes_in(NodeState::Ready) {
            tracing::info!(job_id = %job_id, "all nodes ready, starting");
            self.master
                .transition(&job_id, Phase::Running, NodeState::Running);
            self.settle().await?;
            Phase::Completed
        } else {
            tracing::warn!(job_id = %job_id, "not every node got ready, aborting");
            self.master.set_phase(&job_id, Phase::Aborted);
            self.settle().await?;
            Phase::Aborted
        };

        let entry = self
            .master
            .entry(&job_id)
            .ok_or_else(|| SimError::MissingEntry(job_id.clone()))?;
        let node_states = entry.node_states.clone();

        self.master.set_phase(&job_id, Phase::Completed);
        self.settle().await?;

        let mut leftover_jobs = 0;
        for attached in &self.nodes {
            leftover_jobs += attached.node.job_count().await;
        }

        Ok(SimReport {
            job_id,
            outcome,
            node_states,
            messages: self
                .network
                .counts()
                .into_iter()
                .map(|(action, count)| (action.to_string(), count))
                .collect(),
            dropped: self.network.dropped_count(),
            leftover_jobs,
        })
    }
}
