use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use super::health::ClusterHealth;
use super::poller::{PollError, Poller, Step};
use crate::domain::models::{ClusterEndpoint, DriverConfig};
use crate::error::DriverError;
use crate::infrastructure::controlplane::{ControlPlaneClient, ControlPlaneError};

/// Node membership orchestration: join, eject, recover, and the post-stop
/// verifications.
///
/// All topology bodies are assembled by hand; the rebalance controller
/// matches otp node lists (`ns_1@host`) byte for byte and a form serializer
/// would not preserve them.
#[derive(Debug, Clone)]
pub struct TopologyService {
    client: ControlPlaneClient,
    config: DriverConfig,
    health: ClusterHealth,
    shutdown: Option<broadcast::Sender<()>>,
}

impl TopologyService {
    pub fn new(client: ControlPlaneClient, config: DriverConfig) -> Self {
        let health = ClusterHealth::new(client.clone(), config.clone());
        Self {
            client,
            config,
            health,
            shutdown: None,
        }
    }

    /// Abort any in-flight poll early when `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: broadcast::Sender<()>) -> Self {
        self.health = self.health.clone().with_shutdown(shutdown.clone());
        self.shutdown = Some(shutdown);
        self
    }

    pub fn health(&self) -> &ClusterHealth {
        &self.health
    }

    fn poller(&self, operation: &str, deadline: Duration) -> Poller {
        let poller = Poller::new(operation, deadline, self.config.poll_interval());
        match &self.shutdown {
            Some(tx) => poller.with_shutdown(tx.subscribe()),
            None => poller,
        }
    }

    /// Join `server_to_add` to the cluster this service points at.
    ///
    /// A node fresh out of provisioning intermittently rejects the join with
    /// a transient non-2xx while its cluster manager settles, so the call is
    /// repeated until it succeeds or the deadline passes. The node is
    /// joined but carries no data until the next rebalance.
    #[instrument(skip(self, server_to_add), fields(node = %server_to_add.node()))]
    pub async fn add_node(
        &self,
        server_to_add: &ClusterEndpoint,
        services: &str,
    ) -> Result<(), DriverError> {
        let credentials = self.client.endpoint().credentials();
        let body = format!(
            "hostname={}&user={}&password={}&services={}",
            server_to_add.node().as_str(),
            credentials.username,
            credentials.password,
            services
        );

        info!("adding node to cluster");
        let joined: Result<(), PollError<ControlPlaneError>> = self
            .poller("add node", self.config.client_request_deadline())
            .fold((), |()| {
                let body = body.clone();
                async move {
                    let status = self.client.post_form_raw("/controller/addNode", body).await?;
                    if status.is_success() {
                        Ok(Step::Done(()))
                    } else {
                        warn!(%status, "add node rejected, retrying");
                        Ok(Step::Pending(()))
                    }
                }
            })
            .await;
        joined?;

        info!("node added");
        Ok(())
    }

    /// Rebalance wave that ejects `server_to_remove` from the cluster,
    /// blocking until the rebalance completes.
    ///
    /// `cluster_servers` must be the full current membership, ejected node
    /// included; the controller rejects a known-nodes list that disagrees
    /// with its own.
    #[instrument(skip(self, cluster_servers, server_to_remove), fields(node = %server_to_remove.node()))]
    pub async fn rebalance_out(
        &self,
        cluster_servers: &[ClusterEndpoint],
        server_to_remove: &ClusterEndpoint,
    ) -> Result<(), DriverError> {
        info!("starting rebalance out");
        self.client
            .post_form(
                "/controller/rebalance",
                rebalance_out_body(cluster_servers, server_to_remove),
            )
            .await?;
        self.health.wait_for_rebalance_complete().await?;

        info!("node rebalanced out");
        Ok(())
    }

    /// Rebalance wave that pulls a previously added `server_to_add` into
    /// active service, blocking until the rebalance completes.
    ///
    /// `cluster_servers` is the membership before the addition; the joined
    /// node goes last in the known-nodes list.
    #[instrument(skip(self, cluster_servers, server_to_add), fields(node = %server_to_add.node()))]
    pub async fn rebalance_in(
        &self,
        cluster_servers: &[ClusterEndpoint],
        server_to_add: &ClusterEndpoint,
    ) -> Result<(), DriverError> {
        info!("starting rebalance in");
        self.client
            .post_form(
                "/controller/rebalance",
                rebalance_in_body(cluster_servers, server_to_add),
            )
            .await?;
        self.health.wait_for_rebalance_complete().await?;

        info!("node rebalanced in");
        Ok(())
    }

    /// Mark a failed-over node for delta recovery, so the next rebalance
    /// catches it up from its existing data files instead of rebuilding it.
    pub async fn recover(&self, server: &ClusterEndpoint) -> Result<(), DriverError> {
        let otp = server.node().otp_name();
        info!(node = %otp, "setting delta recovery");
        self.client
            .post_form(
                "/controller/setRecoveryType",
                format!("otpNode={otp}&recoveryType=delta"),
            )
            .await?;
        Ok(())
    }

    /// Assert the running server version matches `expected` (`X.Y.Z` or
    /// `X.Y.Z-build`; a bare release matches any build of it).
    pub async fn verify_server_version(&self, expected: &str) -> Result<(), DriverError> {
        let running = self.client.server_version().await?;
        if running.matches(expected) {
            info!(version = %running, "server version verified");
            return Ok(());
        }
        Err(DriverError::VersionMismatch {
            expected: expected.to_string(),
            running: running.short(),
        })
    }

    /// Assert that none of `endpoints` answers its admin port any more.
    ///
    /// Used after tearing a cluster down: connection refused is the desired
    /// state, any HTTP answer at all means the service is still up. Errors
    /// other than connection failures are real problems and propagate.
    pub async fn verify_no_running_services(
        &self,
        endpoints: &[ClusterEndpoint],
    ) -> Result<(), DriverError> {
        let mut running = Vec::new();
        for endpoint in endpoints {
            let probe = ControlPlaneClient::new(endpoint.clone(), &self.config)?;
            match probe.get_raw("/pools").await {
                Ok(status) => {
                    warn!(endpoint = %endpoint, %status, "service still answering");
                    running.push(endpoint.base_url().to_string());
                }
                Err(err) if err.is_connection() => {
                    info!(endpoint = %endpoint, "service is down");
                }
                Err(err) => return Err(err.into()),
            }
        }

        if running.is_empty() {
            Ok(())
        } else {
            Err(DriverError::ServicesStillRunning(running))
        }
    }
}

/// Known nodes are the full current membership, the ejected node included.
fn rebalance_out_body(cluster_servers: &[ClusterEndpoint], target: &ClusterEndpoint) -> String {
    let mut body = format!("ejectedNodes={}&knownNodes=", target.node().otp_name());
    for server in cluster_servers {
        body.push_str(&server.node().otp_name());
        body.push(',');
    }
    body
}

/// Known nodes are the prior membership followed by the joined node, which
/// goes last and takes no trailing comma.
fn rebalance_in_body(cluster_servers: &[ClusterEndpoint], target: &ClusterEndpoint) -> String {
    let added = target.node();
    let mut body = String::from("knownNodes=");
    for server in cluster_servers {
        if server.node() == added {
            continue;
        }
        body.push_str(&server.node().otp_name());
        body.push(',');
    }
    body.push_str(&added.otp_name());
    body
}
