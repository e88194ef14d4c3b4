use serde::Deserialize;

use super::capabilities::BucketAuthMode;

/// Everything needed to create one server bucket.
///
/// The RAM quota is computed from cluster capacity, never caller-supplied;
/// see `BucketManager::ram_per_bucket_mb`.
#[derive(Debug, Clone)]
pub struct BucketSpec {
    pub name: String,
    pub ram_quota_mb: i64,
    pub replicas: u32,
    pub flush_enabled: bool,
    pub auth: BucketAuthMode,
}

impl BucketSpec {
    pub fn new(name: impl Into<String>, ram_quota_mb: i64, auth: BucketAuthMode) -> Self {
        Self {
            name: name.into(),
            ram_quota_mb,
            replicas: 1,
            flush_enabled: true,
            auth,
        }
    }

    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = replicas;
        self
    }
}

/// One entry of `GET /pools/default/buckets`. Only the name is consumed.
#[derive(Debug, Clone, Deserialize)]
pub struct BucketInfo {
    pub name: String,
}
