use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunable constants for the driver.
///
/// The defaults mirror the values the cluster was historically driven with;
/// none of them are invariants. Loaded hierarchically by
/// `infrastructure::config::ConfigLoader`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Fraction of total node RAM usable for buckets.
    pub ram_multiplier: f64,

    /// Headroom reserved for the secondary (N1QL) indexer, in MB.
    pub index_reserve_mb: u64,

    /// Rounds of bucket deletion before giving up.
    pub delete_retry_attempts: u32,

    /// Pause between bucket deletion rounds.
    pub delete_retry_backoff_ms: u64,

    /// Pause between convergence poll attempts.
    pub poll_interval_ms: u64,

    /// Deadline for generic convergence operations.
    pub client_request_deadline_secs: u64,

    /// Deadline for rebalance completion. Rebalance is expected to take
    /// materially longer than any other background job.
    pub rebalance_deadline_secs: u64,

    /// Per-request timeout on the underlying HTTP client.
    pub request_timeout_secs: u64,

    /// Bucket password embedded in legacy (pre-RBAC) create requests.
    pub legacy_bucket_password: String,

    /// Fixed proxy port embedded in legacy create requests.
    pub legacy_proxy_port: u16,

    /// Password assigned to the scoped RBAC user of each bucket.
    pub rbac_bucket_password: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            ram_multiplier: 0.80,
            index_reserve_mb: 512,
            delete_retry_attempts: 3,
            delete_retry_backoff_ms: 5_000,
            poll_interval_ms: 1_000,
            client_request_deadline_secs: 120,
            rebalance_deadline_secs: 600,
            request_timeout_secs: 60,
            legacy_bucket_password: "password".to_string(),
            legacy_proxy_port: 11211,
            rbac_bucket_password: "password".to_string(),
        }
    }
}

impl DriverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn delete_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.delete_retry_backoff_ms)
    }

    pub fn client_request_deadline(&self) -> Duration {
        Duration::from_secs(self.client_request_deadline_secs)
    }

    pub fn rebalance_deadline(&self) -> Duration {
        Duration::from_secs(self.rebalance_deadline_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
