use std::num::NonZeroUsize;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

use super::health::ClusterHealth;
use super::poller::Poller;
use crate::domain::models::{
    BucketAuthMode, BucketInfo, BucketSpec, DriverConfig, ServerCapabilities,
};
use crate::error::DriverError;
use crate::infrastructure::controlplane::{ControlPlaneClient, ControlPlaneError, PoolsDefault};

/// Key fetched to prove a bucket is servable; it must never exist, so the
/// expected answer is "key not found".
const READINESS_PROBE_KEY: &str = "cbdrive-readiness-probe";

/// Bucket sizing and lifecycle against one cluster.
///
/// RAM quotas are computed from cluster capacity, divided evenly across the
/// requested buckets; creation and deletion both wait out the control
/// plane's eventual consistency before returning.
#[derive(Debug, Clone)]
pub struct BucketManager {
    client: ControlPlaneClient,
    capabilities: ServerCapabilities,
    config: DriverConfig,
    health: ClusterHealth,
    shutdown: Option<broadcast::Sender<()>>,
}

impl BucketManager {
    pub fn new(
        client: ControlPlaneClient,
        capabilities: ServerCapabilities,
        config: DriverConfig,
    ) -> Self {
        let health = ClusterHealth::new(client.clone(), config.clone());
        Self {
            client,
            capabilities,
            config,
            health,
            shutdown: None,
        }
    }

    /// Probe the server version and build a manager with the detected
    /// capabilities.
    pub async fn detect(
        client: ControlPlaneClient,
        config: DriverConfig,
    ) -> Result<Self, DriverError> {
        let version = client.server_version().await?;
        info!(%version, "detected server version");
        Ok(Self::new(
            client,
            ServerCapabilities::from_version(version),
            config,
        ))
    }

    /// Abort any in-flight poll early when `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: broadcast::Sender<()>) -> Self {
        self.health = self.health.clone().with_shutdown(shutdown.clone());
        self.shutdown = Some(shutdown);
        self
    }

    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    fn poller(&self, operation: &str, deadline: Duration) -> Poller {
        let poller = Poller::new(operation, deadline, self.config.poll_interval());
        match &self.shutdown {
            Some(tx) => poller.with_shutdown(tx.subscribe()),
            None => poller,
        }
    }

    /// Total cluster RAM in MB: the minimum non-zero `mem_total` across all
    /// nodes.
    ///
    /// A node reporting exactly 0 has not finished reporting and is ignored;
    /// sizing from the smallest real node keeps the quota satisfiable
    /// everywhere. Every node reporting 0 is a fatal configuration error,
    /// not a retryable condition.
    pub async fn total_ram_mb(&self) -> Result<u64, DriverError> {
        let pools: PoolsDefault = self.client.get_json("/pools/default").await?;
        pools
            .nodes
            .iter()
            .map(|node| node.system_stats.mem_total)
            .filter(|mem| *mem > 0)
            .min()
            .map(|bytes| bytes / 1_000_000)
            .ok_or(DriverError::NoRamReported)
    }

    /// RAM usable for buckets: total scaled by the multiplier, minus the
    /// indexer reserve.
    pub async fn effective_ram_mb(&self) -> Result<i64, DriverError> {
        let total = self.total_ram_mb().await?;
        Ok(effective_ram_mb(&self.config, total))
    }

    /// Even split of the effective RAM across `buckets` buckets.
    pub async fn ram_per_bucket_mb(&self, buckets: NonZeroUsize) -> Result<i64, DriverError> {
        let effective = self.effective_ram_mb().await?;
        Ok(ram_per_bucket_mb(effective, buckets))
    }

    /// Create every named bucket with an even share of the effective RAM.
    pub async fn create_buckets(&self, names: &[String]) -> Result<(), DriverError> {
        let Some(count) = NonZeroUsize::new(names.len()) else {
            return Ok(());
        };

        let quota = self.ram_per_bucket_mb(count).await?;
        info!(buckets = ?names, per_bucket_ram_mb = quota, "creating buckets");
        for name in names {
            let spec = BucketSpec::new(name.clone(), quota, self.capabilities.bucket_auth());
            self.create_bucket(&spec).await?;
        }
        Ok(())
    }

    /// Create one bucket and block until it is actually usable.
    ///
    /// The admin call returning success only means the bucket is registered.
    /// Before returning, probe the data path until a trivial key fetch
    /// answers "key not found", proof the bucket is servable, and then
    /// wait for every node to report healthy so dependent services do not
    /// trip over warmup.
    #[instrument(skip(self, spec), fields(bucket = %spec.name, ram_quota_mb = spec.ram_quota_mb))]
    pub async fn create_bucket(&self, spec: &BucketSpec) -> Result<(), DriverError> {
        info!("creating bucket");
        self.client
            .post_form("/pools/default/buckets", self.create_body(spec))
            .await?;

        if spec.auth == BucketAuthMode::Rbac {
            self.create_rbac_bucket_user(&spec.name).await?;
        }

        self.wait_for_bucket_servable(&spec.name).await?;
        self.health.wait_for_ready_state().await?;

        info!("bucket is ready");
        Ok(())
    }

    fn create_body(&self, spec: &BucketSpec) -> String {
        let flush = if spec.flush_enabled { "1" } else { "0" };
        match spec.auth {
            // Modern servers authenticate through the scoped RBAC user
            // provisioned right after creation.
            BucketAuthMode::Rbac => format!(
                "name={}&ramQuotaMB={}&bucketType=couchbase&replicaNumber={}&flushEnabled={}",
                spec.name, spec.ram_quota_mb, spec.replicas, flush
            ),
            // Pre-RBAC servers embed the bucket password and a fixed proxy
            // port in the create request itself.
            BucketAuthMode::LegacySasl => format!(
                "name={}&ramQuotaMB={}&authType=sasl&saslPassword={}&proxyPort={}&bucketType=couchbase&replicaNumber={}&flushEnabled={}",
                spec.name,
                spec.ram_quota_mb,
                self.config.legacy_bucket_password,
                self.config.legacy_proxy_port,
                spec.replicas,
                flush
            ),
        }
    }

    /// Provision the scoped data-plane credential tied 1:1 to the bucket:
    /// username = bucket name, read-only admin plus full access to this
    /// bucket only.
    async fn create_rbac_bucket_user(&self, bucket: &str) -> Result<(), DriverError> {
        info!(bucket, "provisioning scoped RBAC user");
        let body = format!(
            "password={}&roles=ro_admin,bucket_full_access[{}]",
            self.config.rbac_bucket_password, bucket
        );
        self.client
            .put_form(&format!("/settings/rbac/users/local/{bucket}"), body)
            .await?;
        Ok(())
    }

    async fn wait_for_bucket_servable(&self, bucket: &str) -> Result<(), DriverError> {
        let path = format!("/pools/default/buckets/{bucket}/docs/{READINESS_PROBE_KEY}");
        self.poller(
            "bucket read availability",
            self.config.client_request_deadline(),
        )
        .until(
            || self.client.get_raw(&path),
            |status| *status == StatusCode::NOT_FOUND,
            |status| info!(bucket, %status, "bucket not servable yet, retrying"),
        )
        .await?;

        info!(bucket, "key not found: bucket is servable");
        Ok(())
    }

    /// Delete one bucket, removing its orphaned RBAC user first on servers
    /// that have one. A missing user is tolerated; the bucket may predate
    /// the RBAC cutover or have been created elsewhere.
    pub async fn delete_bucket(&self, name: &str) -> Result<(), DriverError> {
        if self.capabilities.bucket_auth() == BucketAuthMode::Rbac {
            match self
                .client
                .delete(&format!("/settings/rbac/users/local/{name}"))
                .await
            {
                Ok(()) => info!(bucket = name, "deleted scoped RBAC user"),
                Err(ControlPlaneError::Status { status, .. })
                    if status == StatusCode::NOT_FOUND =>
                {
                    info!(bucket = name, "no RBAC user to delete");
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.client
            .delete(&format!("/pools/default/buckets/{name}"))
            .await?;
        info!(bucket = name, "deleted bucket");
        Ok(())
    }

    /// Delete every bucket, retrying a bounded number of rounds.
    ///
    /// The control plane intermittently answers 500 on an otherwise
    /// successful delete, so HTTP failures within a round are tolerated and
    /// the full bucket list is re-fetched before the next round; retries
    /// must operate on current truth, not a stale list. Exhausting the
    /// rounds is fatal.
    pub async fn delete_all_buckets(&self) -> Result<(), DriverError> {
        let attempts = self.config.delete_retry_attempts;
        for round in 0..attempts {
            let names = self.bucket_names().await?;
            if names.is_empty() {
                return Ok(());
            }
            info!(buckets = ?names, round, "deleting buckets");

            let mut failures = 0u32;
            for name in &names {
                match self.delete_bucket(name).await {
                    Ok(()) => {}
                    Err(DriverError::ControlPlane(err)) => {
                        warn!(bucket = %name, error = %err, "failed to delete bucket, will retry");
                        failures += 1;
                    }
                    Err(err) => return Err(err),
                }
            }

            if failures == 0 {
                return Ok(());
            }
            sleep(self.config.delete_retry_backoff()).await;
        }

        let remaining = self.bucket_names().await.unwrap_or_default();
        Err(DriverError::DeleteRetriesExhausted {
            attempts,
            remaining,
        })
    }

    async fn bucket_names(&self) -> Result<Vec<String>, DriverError> {
        let buckets: Vec<BucketInfo> = self.client.get_json("/pools/default/buckets").await?;
        Ok(buckets.into_iter().map(|b| b.name).collect())
    }
}

/// `effective = floor(total * multiplier) - reserve`, in MB.
pub fn effective_ram_mb(config: &DriverConfig, total_ram_mb: u64) -> i64 {
    (total_ram_mb as f64 * config.ram_multiplier) as i64 - config.index_reserve_mb as i64
}

/// Even floor-division split of the effective RAM.
pub fn ram_per_bucket_mb(effective_ram_mb: i64, buckets: NonZeroUsize) -> i64 {
    effective_ram_mb / buckets.get() as i64
}
