//! In-memory network implementing the cluster transport.
//!
//! Requests and replies are serialized to JSON and decoded on the other side,
//! so every message crosses the same wire format a real transport would use.
//! Loss is drawn from a seeded RNG and is reproducible for a given seed and
//! message order.

use crate::seed::SimSeed;
use async_trait::async_trait;
use benchmesh_cluster::{
    RequestHandler, Transport, TransportError, TransportRequest, TransportResponse,
};
use benchmesh_core::NodeId;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Network condition applied to every message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetworkCondition {
    /// Every message is delivered
    Normal,
    /// Each message is dropped with the given probability
    PacketLoss {
        /// Drop probability in `[0, 1]`
        probability: f64,
    },
}

impl NetworkCondition {
    /// Draw whether the next message is delivered
    #[must_use]
    pub fn is_delivered(&self, rng: &mut ChaCha8Rng) -> bool {
        match self {
            Self::Normal => true,
            Self::PacketLoss { probability } => rng.r#gen::<f64>() >= *probability,
        }
    }
}

/// Why a message was not delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    /// Lost by the network condition
    Lost,
    /// Sender or receiver is isolated
    Partitioned,
    /// The action is blocked
    Blocked,
}

/// One message seen by the network
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    /// Sender
    pub from: NodeId,
    /// Receiver
    pub to: NodeId,
    /// Action name
    pub action: &'static str,
    /// Request payload
    pub request: TransportRequest,
    /// Why it was dropped, `None` if delivered
    pub dropped: Option<DropReason>,
}

struct NetworkInner {
    handlers: RwLock<HashMap<(NodeId, &'static str), Arc<dyn RequestHandler>>>,
    rng: Mutex<ChaCha8Rng>,
    condition: Mutex<NetworkCondition>,
    isolated: Mutex<HashSet<NodeId>>,
    blocked: Mutex<HashSet<&'static str>>,
    log: Mutex<Vec<MessageRecord>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated network shared by every node of a cluster
#[derive(Clone)]
pub struct SimNetwork {
    inner: Arc<NetworkInner>,
}

impl SimNetwork {
    /// Create a loss-free network
    #[must_use]
    pub fn new(seed: &SimSeed) -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                handlers: RwLock::new(HashMap::new()),
                rng: Mutex::new(seed.derive("network").rng()),
                condition: Mutex::new(NetworkCondition::Normal),
                isolated: Mutex::new(HashSet::new()),
                blocked: Mutex::new(HashSet::new()),
                log: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Transport endpoint for a node
    #[must_use]
    pub fn transport(&self, node_id: NodeId) -> Arc<SimTransport> {
        Arc::new(SimTransport {
            node_id,
            network: self.clone(),
        })
    }

    /// Replace the network condition
    pub fn set_condition(&self, condition: NetworkCondition) {
        *lock(&self.inner.condition) = condition;
    }

    /// Drop a fraction of all messages
    pub fn set_packet_loss(&self, probability: f64) {
        self.set_condition(NetworkCondition::PacketLoss { probability });
    }

    /// Cut a node off from every other node
    pub fn isolate(&self, node_id: NodeId) {
        lock(&self.inner.isolated).insert(node_id);
    }

    /// Reconnect an isolated node
    pub fn heal(&self, node_id: &NodeId) {
        lock(&self.inner.isolated).remove(node_id);
    }

    /// Fail every message of an action
    pub fn block_action(&self, action: &'static str) {
        lock(&self.inner.blocked).insert(action);
    }

    /// Stop failing messages of an action
    pub fn unblock_action(&self, action: &'static str) {
        lock(&self.inner.blocked).remove(action);
    }

    /// Every message seen so far, in send order
    #[must_use]
    pub fn messages(&self) -> Vec<MessageRecord> {
        lock(&self.inner.log).clone()
    }

    /// Requests of an action, delivered or not
    #[must_use]
    pub fn sent(&self, action: &str) -> Vec<TransportRequest> {
        lock(&self.inner.log)
            .iter()
            .filter(|m| m.action == action)
            .map(|m| m.request.clone())
            .collect()
    }

    /// Number of requests of an action, delivered or not
    #[must_use]
    pub fn sent_count(&self, action: &str) -> usize {
        lock(&self.inner.log)
            .iter()
            .filter(|m| m.action == action)
            .count()
    }

    /// Message counts by action
    #[must_use]
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for message in lock(&self.inner.log).iter() {
            *counts.entry(message.action).or_insert(0) += 1;
        }
        counts
    }

    /// Number of messages the network dropped
    #[must_use]
    pub fn dropped_count(&self) -> usize {
        lock(&self.inner.log)
            .iter()
            .filter(|m| m.dropped.is_some())
            .count()
    }

    fn register(&self, node_id: NodeId, action: &'static str, handler: Arc<dyn RequestHandler>) {
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((node_id, action), handler);
    }

    fn handler(&self, node_id: &NodeId, action: &'static str) -> Option<Arc<dyn RequestHandler>> {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(node_id.clone(), action))
            .cloned()
    }

    fn route(&self, from: &NodeId, to: &NodeId, action: &'static str) -> Option<DropReason> {
        if lock(&self.inner.blocked).contains(action) {
            return Some(DropReason::Blocked);
        }
        {
            let isolated = lock(&self.inner.isolated);
            if from != to && (isolated.contains(from) || isolated.contains(to)) {
                return Some(DropReason::Partitioned);
            }
        }
        let condition = lock(&self.inner.condition).clone();
        if condition.is_delivered(&mut lock(&self.inner.rng)) {
            None
        } else {
            Some(DropReason::Lost)
        }
    }

    async fn deliver(
        &self,
        from: &NodeId,
        to: &NodeId,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let action = request.action();
        let bytes = request
            .encode()
            .map_err(|e| TransportError::Serialization(e.to_string()))?;

        let dropped = self.route(from, to, action);
        lock(&self.inner.log).push(MessageRecord {
            from: from.clone(),
            to: to.clone(),
            action,
            request,
            dropped,
        });
        match dropped {
            Some(DropReason::Lost) => {
                tracing::debug!(%from, %to, action, "message lost");
                return Err(TransportError::ConnectionFailed(format!("{action} to {to} lost")));
            }
            Some(DropReason::Partitioned) => return Err(TransportError::NodeUnavailable(to.clone())),
            Some(DropReason::Blocked) => {
                return Err(TransportError::ConnectionFailed(format!("{action} blocked")));
            }
            None => {}
        }

        let handler = self
            .handler(to, action)
            .ok_or_else(|| TransportError::NoHandler(action.to_string()))?;
        let request = TransportRequest::decode(&bytes)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;
        let response = handler.handle(request).await?;

        let bytes = response
            .encode()
            .map_err(|e| TransportError::Serialization(e.to_string()))?;
        TransportResponse::decode(&bytes).map_err(|e| TransportError::Serialization(e.to_string()))
    }
}

impl std::fmt::Debug for SimNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimNetwork")
            .field("condition", &*lock(&self.inner.condition))
            .field("messages", &lock(&self.inner.log).len())
            .finish_non_exhaustive()
    }
}

/// A node's endpoint on a [`SimNetwork`]
#[derive(Debug)]
pub struct SimTransport {
    node_id: NodeId,
    network: SimNetwork,
}

impl SimTransport {
    /// Node this endpoint belongs to
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }
}

#[async_trait]
impl Transport for SimTransport {
    async fn send_request(
        &self,
        target: &NodeId,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        self.network.deliver(&self.node_id, target, request).await
    }

    fn register_handler(&self, action: &'static str, handler: Arc<dyn RequestHandler>) {
        self.network.register(self.node_id.clone(), action, handler);
    }
}
