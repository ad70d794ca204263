//! Executor nodes for the simulated cluster.

use async_trait::async_trait;
use benchmesh_cluster::ClusterChangedEvent;
use benchmesh_executor::ExecutorService;
use benchmesh_sim::SimNode;

/// An [`ExecutorService`] driven by the simulation harness
pub struct ExecutorNode(pub ExecutorService);

#[async_trait]
impl SimNode for ExecutorNode {
    async fn cluster_changed(&self, event: &ClusterChangedEvent) {
        self.0.cluster_changed(event).await;
    }

    async fn quiesce(&self) {
        self.0.quiesce().await;
    }

    async fn job_count(&self) -> usize {
        self.0.registry().len().await
    }
}
