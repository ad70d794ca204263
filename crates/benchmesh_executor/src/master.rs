//! Messaging with the master.
//!
//! Outbound requests are fire-and-forget: each one is spawned on the generic
//! pool and its reply is handled by a continuation in the same task. A
//! continuation never awaits another round trip to the master; follow-up
//! reports are spawned as new sends.

use crate::error::ExecutorError;
use crate::registry::LocalJobRegistry;
use async_trait::async_trait;
use benchmesh_cluster::{
    DefinitionRequest, DefinitionResponse, NodeStateUpdate, RemoteError, RequestHandler,
    StatusResponse, Transport, TransportError, TransportRequest, TransportResponse,
};
use benchmesh_core::{JobId, NodeId, NodeState};
use benchmesh_runtime::{BackendError, ExecutionBackend, ThreadPools};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;

/// Everything the executor's tasks share
pub(crate) struct ExecutorContext {
    pub(crate) node_id: NodeId,
    pub(crate) registry: LocalJobRegistry,
    pub(crate) backend: Arc<dyn ExecutionBackend>,
    pub(crate) pools: ThreadPools,
    transport: Arc<dyn Transport>,
    master: RwLock<Option<NodeId>>,
}

impl ExecutorContext {
    pub(crate) fn new(
        node_id: NodeId,
        backend: Arc<dyn ExecutionBackend>,
        transport: Arc<dyn Transport>,
        pools: ThreadPools,
    ) -> Self {
        Self {
            node_id,
            registry: LocalJobRegistry::new(),
            backend,
            pools,
            transport,
            master: RwLock::new(None),
        }
    }

    pub(crate) async fn set_master(&self, master: Option<NodeId>) {
        let mut current = self.master.write().await;
        if *current != master {
            tracing::debug!(master = ?master, "master changed");
            *current = master;
        }
    }

    pub(crate) async fn master(&self) -> Option<NodeId> {
        self.master.read().await.clone()
    }

    async fn send_to_master(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let master = self.master().await.ok_or(TransportError::NoMaster)?;
        self.transport.send_request(&master, request).await
    }

    /// Drop local and backend state of a benchmark
    pub(crate) async fn teardown(&self, job_id: &JobId) {
        self.registry.remove(job_id).await;
        self.backend.clear(job_id);
    }

    /// Fetch a definition; the reply is handled by
    /// [`ExecutorContext::handle_definition_response`]
    pub(crate) fn request_definition(self: &Arc<Self>, job_id: JobId) {
        let ctx = Arc::clone(self);
        self.pools.spawn(async move {
            let request = TransportRequest::Definition(DefinitionRequest {
                job_id: job_id.clone(),
                node_id: ctx.node_id.clone(),
            });
            let result = ctx
                .send_to_master(request)
                .await
                .and_then(TransportResponse::into_definition);
            ctx.handle_definition_response(&job_id, result).await;
        });
    }

    /// Report a node-state transition; the ack is handled by
    /// [`ExecutorContext::handle_node_state_ack`]
    pub(crate) fn update_node_state(self: &Arc<Self>, job_id: JobId, state: NodeState) {
        let ctx = Arc::clone(self);
        self.pools.spawn(async move {
            tracing::debug!(job_id = %job_id, state = %state, "reporting node state");
            let request = TransportRequest::NodeState(NodeStateUpdate {
                job_id: job_id.clone(),
                node_id: ctx.node_id.clone(),
                state,
            });
            let result = ctx
                .send_to_master(request)
                .await
                .and_then(TransportResponse::into_ack);
            ctx.handle_node_state_ack(&job_id, result).await;
        });
    }

    pub(crate) async fn handle_definition_response(
        self: &Arc<Self>,
        job_id: &JobId,
        result: Result<DefinitionResponse, TransportError>,
    ) {
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "failed to fetch benchmark definition");
                self.teardown(job_id).await;
                return;
            }
        };

        let Some(state) = self.registry.get(job_id).await else {
            let err = ExecutorError::illegal_state(job_id, "missing internal state");
            tracing::error!(error = %err, "definition arrived for unknown benchmark");
            self.backend.clear(job_id);
            return;
        };
        state.set_request(response.definition.clone());

        let backend = Arc::clone(&self.backend);
        let definition = response.definition;
        let created = self
            .pools
            .spawn_blocking(move || backend.create(&definition))
            .await
            .unwrap_or_else(|e| Err(BackendError::CreateFailed(e.to_string())));

        match created {
            Ok(()) => self.update_node_state(job_id.clone(), NodeState::Ready),
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "failed to create benchmark");
                self.teardown(job_id).await;
                self.update_node_state(job_id.clone(), NodeState::Failed);
            }
        }
    }

    pub(crate) async fn handle_node_state_ack(
        &self,
        job_id: &JobId,
        result: Result<(), TransportError>,
    ) {
        if let Err(e) = result {
            tracing::error!(job_id = %job_id, error = %e, "master did not accept node state");
            self.teardown(job_id).await;
        }
    }
}

/// Serves the master's status pulls
pub(crate) struct StatusRequestHandler {
    ctx: Weak<ExecutorContext>,
}

impl StatusRequestHandler {
    pub(crate) fn new(ctx: &Arc<ExecutorContext>) -> Self {
        Self {
            ctx: Arc::downgrade(ctx),
        }
    }
}

#[async_trait]
impl RequestHandler for StatusRequestHandler {
    async fn handle(&self, request: TransportRequest) -> Result<TransportResponse, RemoteError> {
        let ctx = self
            .ctx
            .upgrade()
            .ok_or_else(|| RemoteError::Failed("executor stopped".to_string()))?;
        let job_id = match request {
            TransportRequest::Status(request) => request.job_id,
            other => {
                return Err(RemoteError::IllegalState(format!(
                    "unexpected {} request",
                    other.action()
                )));
            }
        };

        let Some(state) = ctx.registry.get(&job_id).await else {
            let err = ExecutorError::illegal_state(&job_id, "missing internal state");
            return Err(RemoteError::IllegalState(err.to_string()));
        };

        // A finished run is answered from the cached result; the backend
        // may already have released the workload.
        if state.is_complete() {
            let response = state.response().ok_or_else(|| {
                let err = ExecutorError::illegal_state(&job_id, "complete without a response");
                RemoteError::IllegalState(err.to_string())
            })?;
            return Ok(TransportResponse::Status(StatusResponse {
                job_id,
                node_id: ctx.node_id.clone(),
                response,
            }));
        }

        let backend = Arc::clone(&ctx.backend);
        let id = job_id.clone();
        let status = ctx
            .pools
            .spawn_blocking(move || backend.status(&id))
            .await
            .map_err(|e| RemoteError::Failed(e.to_string()))?
            .map_err(|e| {
                tracing::error!(job_id = %job_id, error = %e, "status query failed");
                RemoteError::Failed(e.to_string())
            })?;

        if let Some(error) = status.error {
            return Err(RemoteError::Failed(error));
        }
        Ok(TransportResponse::Status(StatusResponse {
            job_id,
            node_id: ctx.node_id.clone(),
            response: status.response,
        }))
    }
}
