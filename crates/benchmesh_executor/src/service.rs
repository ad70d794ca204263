//! Cluster change coordinator.
//!
//! Turns cluster-state changes into backend calls and node-state reports for
//! the benchmarks assigned to this node. Event processing never blocks on the
//! backend: runs go to the bench pool, the other backend calls and every
//! send go to the generic pool.

use crate::config::ExecutorConfig;
use crate::decision::{decide, Decision};
use crate::error::{ExecutorError, ExecutorResult};
use crate::guard::InternalExecutorState;
use crate::master::{ExecutorContext, StatusRequestHandler};
use crate::registry::LocalJobRegistry;
use crate::translate::to_node_state;
use benchmesh_cluster::{
    actions, BenchmarkMetadata, ClusterChangedEvent, JobEntry, Member, Transport,
};
use benchmesh_core::{JobId, NodeId, NodeState};
use benchmesh_runtime::{
    BackendError, BenchmarkStartResponse, ExecutionBackend, PoolError, ThreadPools,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Per-node benchmark executor
pub struct ExecutorService {
    config: ExecutorConfig,
    ctx: Arc<ExecutorContext>,
}

impl ExecutorService {
    /// Create the service and register its status handler on `transport`
    ///
    /// # Errors
    ///
    /// Returns error if the config is invalid
    pub fn new(
        config: ExecutorConfig,
        backend: Arc<dyn ExecutionBackend>,
        transport: Arc<dyn Transport>,
    ) -> ExecutorResult<Self> {
        config.validate()?;
        let pools = ThreadPools::new(config.bench_pool_size);
        let ctx = Arc::new(ExecutorContext::new(
            config.node_id.clone(),
            backend,
            Arc::clone(&transport),
            pools,
        ));
        transport.register_handler(
            actions::NODE_STATUS,
            Arc::new(StatusRequestHandler::new(&ctx)),
        );
        Ok(Self { config, ctx })
    }

    /// Node this executor runs on
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.config.node_id
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Benchmarks with local state
    #[must_use]
    pub fn registry(&self) -> &LocalJobRegistry {
        &self.ctx.registry
    }

    /// Master the executor currently reports to
    pub async fn master(&self) -> Option<NodeId> {
        self.ctx.master().await
    }

    /// Channel sized for [`ExecutorService::run`]
    #[must_use]
    pub fn event_channel(
        &self,
    ) -> (
        mpsc::Sender<ClusterChangedEvent>,
        mpsc::Receiver<ClusterChangedEvent>,
    ) {
        mpsc::channel(self.config.event_buffer)
    }

    /// Process events in delivery order until the channel closes or
    /// `shutdown` fires, then wait for in-flight work
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<ClusterChangedEvent>,
        shutdown: CancellationToken,
    ) {
        tracing::info!(node_id = %self.config.node_id, "executor started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.cluster_changed(&event).await,
                    None => break,
                },
            }
        }
        self.shutdown().await;
        tracing::info!(node_id = %self.config.node_id, "executor stopped");
    }

    /// Wait until all work triggered so far has finished
    pub async fn quiesce(&self) {
        self.ctx.pools.quiesce().await;
    }

    /// Stop starting runs and wait for in-flight work
    pub async fn shutdown(&self) {
        self.ctx.pools.shutdown().await;
    }

    /// Apply a cluster-state change
    ///
    /// Entries are processed independently: a failure on one is logged and
    /// the rest are still applied.
    pub async fn cluster_changed(&self, event: &ClusterChangedEvent) {
        self.ctx
            .set_master(event.state.membership.master_node_id().cloned())
            .await;

        let node_id = &self.config.node_id;
        let is_benchmark_node = event
            .state
            .membership
            .get_member(node_id)
            .is_some_and(Member::is_benchmark_node);
        if !is_benchmark_node || !event.metadata_changed() {
            return;
        }
        let Some(current) = event.state.benchmarks() else {
            return;
        };
        if current.is_empty() {
            return;
        }

        for entry in BenchmarkMetadata::added_or_changed(event.previous_state.benchmarks(), current) {
            let Some(local) = entry.node_state(node_id) else {
                continue;
            };
            if let Err(e) = self.apply(entry, local).await {
                tracing::error!(job_id = %entry.job_id, error = %e, "failed to apply benchmark change");
            }
        }
    }

    async fn apply(&self, entry: &JobEntry, local: NodeState) -> ExecutorResult<()> {
        let job_id = &entry.job_id;
        let state = self.ctx.registry.get(job_id).await;
        let decision = decide(job_id, entry.phase, local, state.is_some())?;
        tracing::debug!(
            job_id = %job_id,
            phase = %entry.phase,
            node_state = %local,
            ?decision,
            "benchmark entry changed"
        );

        match (decision, state) {
            (Decision::Initialize, _) => self.initialize(job_id).await,
            (Decision::Start, Some(state)) => self.start(state),
            (Decision::Resume, Some(state)) => {
                if state.can_resume_execution() {
                    self.spawn_backend_call(state, NodeState::Running, |backend, id| backend.resume(id), |_| {});
                }
            }
            (Decision::Pause, Some(state)) => {
                self.spawn_backend_call(
                    state,
                    NodeState::Paused,
                    |backend, id| backend.pause(id),
                    InternalExecutorState::pause_execution,
                );
            }
            (Decision::Abort, Some(state)) => {
                if state.can_abort_execution() {
                    self.spawn_backend_call(state, NodeState::Aborted, |backend, id| backend.abort(id), |_| {});
                }
            }
            (Decision::Clear, _) => self.ctx.teardown(job_id).await,
            _ => {}
        }
        Ok(())
    }

    async fn initialize(&self, job_id: &JobId) {
        if self.ctx.registry.create(job_id).await.is_none() {
            return;
        }
        self.ctx.request_definition(job_id.clone());
    }

    fn start(&self, state: Arc<InternalExecutorState>) {
        if !state.can_start_execution() {
            return;
        }
        let job_id = state.job_id().clone();
        let Some(definition) = state.request() else {
            let err = ExecutorError::illegal_state(&job_id, "started before its definition arrived");
            tracing::error!(error = %err, "cannot start benchmark");
            self.ctx.update_node_state(job_id, NodeState::Failed);
            return;
        };

        let backend = Arc::clone(&self.ctx.backend);
        let run = self.ctx.pools.spawn_bench(move || backend.start(&definition));
        let ctx = Arc::clone(&self.ctx);
        self.ctx.pools.spawn(async move {
            let outcome = match run.await {
                Ok(Ok(result)) => result.map_err(ExecutorError::from),
                Ok(Err(e)) => Err(ExecutorError::from(e)),
                Err(e) => Err(ExecutorError::from(PoolError::Aborted(e.to_string()))),
            };
            let reported = outcome.and_then(|response| finish_run(&state, response));
            match reported {
                Ok(node_state) => ctx.update_node_state(job_id, node_state),
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "benchmark run failed");
                    ctx.update_node_state(job_id, NodeState::Failed);
                }
            }
        });
    }

    /// Run a short backend call on the generic pool and report its outcome
    fn spawn_backend_call<F>(
        &self,
        state: Arc<InternalExecutorState>,
        on_success: NodeState,
        call: F,
        after: fn(&InternalExecutorState),
    ) where
        F: FnOnce(&dyn ExecutionBackend, &JobId) -> Result<(), BackendError> + Send + 'static,
    {
        let ctx = Arc::clone(&self.ctx);
        self.ctx.pools.spawn(async move {
            let job_id = state.job_id().clone();
            let backend = Arc::clone(&ctx.backend);
            let id = job_id.clone();
            let result = ctx
                .pools
                .spawn_blocking(move || call(backend.as_ref(), &id))
                .await
                .unwrap_or_else(|e| Err(BackendError::ExecutionFailed(e.to_string())));
            match result {
                Ok(()) => {
                    after(&state);
                    ctx.update_node_state(job_id, on_success);
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, state = %on_success, "backend call failed");
                    ctx.update_node_state(job_id, NodeState::Failed);
                }
            }
        });
    }
}

/// Record a finished run and pick the state to report
fn finish_run(
    state: &InternalExecutorState,
    response: BenchmarkStartResponse,
) -> ExecutorResult<NodeState> {
    let code = response.state;
    state.set_response(response);
    state.stop_execution();
    to_node_state(state.job_id(), code)
}

impl std::fmt::Debug for ExecutorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorService")
            .field("config", &self.config)
            .field("bench_pool_size", &self.ctx.pools.bench_size())
            .finish_non_exhaustive()
    }
}
