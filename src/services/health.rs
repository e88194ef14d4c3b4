use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info};

use super::poller::{Poller, Step};
use crate::domain::models::{ClusterTask, DriverConfig};
use crate::error::DriverError;
use crate::infrastructure::controlplane::{ControlPlaneClient, NodesResponse};

/// Convergence checks against the cluster's health and task endpoints.
///
/// All state is call-local; a `ClusterHealth` may be shared freely across
/// concurrent orchestration calls targeting the same endpoint.
#[derive(Debug, Clone)]
pub struct ClusterHealth {
    client: ControlPlaneClient,
    config: DriverConfig,
    shutdown: Option<broadcast::Sender<()>>,
}

impl ClusterHealth {
    pub fn new(client: ControlPlaneClient, config: DriverConfig) -> Self {
        Self {
            client,
            config,
            shutdown: None,
        }
    }

    /// Abort any in-flight poll early when `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: broadcast::Sender<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn poller(&self, operation: &str, deadline: Duration) -> Poller {
        let poller = Poller::new(operation, deadline, self.config.poll_interval());
        match &self.shutdown {
            Some(tx) => poller.with_shutdown(tx.subscribe()),
            None => poller,
        }
    }

    /// Block until every node reports status `"healthy"`.
    ///
    /// Any other status, `"warmup"` included, is not-done. Connection errors
    /// are expected while a node comes online and are retried.
    pub async fn wait_for_ready_state(&self) -> Result<(), DriverError> {
        self.poller("node health", self.config.client_request_deadline())
            .until(
                || self.client.get_json::<NodesResponse>("/pools/nodes"),
                |resp| resp.nodes.iter().all(|node| node.is_healthy()),
                |resp| {
                    for node in resp.nodes.iter().filter(|n| !n.is_healthy()) {
                        info!(
                            status = %node.status,
                            hostname = node.hostname.as_deref().unwrap_or("unknown"),
                            "node not healthy yet, retrying"
                        );
                    }
                },
            )
            .await?;

        info!("all nodes are healthy");
        Ok(())
    }

    /// Block until the in-flight rebalance finishes.
    ///
    /// Two phases: first wait for a `rebalance` task to even appear in the
    /// task list (the async job may not be scheduled yet when the
    /// controller call returns), then wait, against the longer rebalance
    /// deadline, until no rebalance task is `running`.
    pub async fn wait_for_rebalance_complete(&self) -> Result<(), DriverError> {
        self.poller(
            "rebalance task presence",
            self.config.client_request_deadline(),
        )
        .until(
            || self.client.get_json::<Vec<ClusterTask>>("/pools/default/tasks"),
            |tasks| tasks.iter().any(ClusterTask::is_rebalance),
            |_| info!("rebalance not in task list yet, retrying"),
        )
        .await?;
        info!("rebalance found in task list");

        self.poller("rebalance completion", self.config.rebalance_deadline())
            .until(
                || self.client.get_json::<Vec<ClusterTask>>("/pools/default/tasks"),
                |tasks| !tasks.iter().any(|t| t.is_rebalance() && t.is_running()),
                |tasks| {
                    for task in tasks {
                        debug!(task_type = %task.task_type, status = ?task.status, "task running");
                    }
                },
            )
            .await?;

        info!("rebalance complete");
        Ok(())
    }

    /// Block until the admin endpoint stops answering at all.
    ///
    /// Inverted predicate used when stopping a node: a connection error is
    /// the success signal, any HTTP response means the service is still up.
    /// 5xx responses are an expected symptom of a node on its way down and
    /// are retried, not treated as failure.
    pub async fn wait_until_unreachable(&self) -> Result<(), DriverError> {
        self.poller("server shutdown", self.config.client_request_deadline())
            .fold((), |()| async {
                match self.client.get_raw("/pools").await {
                    Err(err) if err.is_connection() => Ok(Step::Done(())),
                    Err(err) => Err(err),
                    Ok(status) if status.is_server_error() => {
                        debug!(%status, "error response while shutting down, retrying");
                        Ok(Step::Pending(()))
                    }
                    Ok(status) => {
                        debug!(%status, "endpoint still reachable, retrying");
                        Ok(Step::Pending(()))
                    }
                }
            })
            .await?;

        info!(endpoint = %self.client.endpoint(), "endpoint is unreachable");
        Ok(())
    }
}
