//! Wire shapes of the admin REST surface the driver consumes. The server
//! reports far more than this; only the consumed fields are modeled.

use serde::Deserialize;

/// `GET /pools/default`: node stats, used for RAM sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolsDefault {
    pub nodes: Vec<NodeInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfo {
    #[serde(rename = "systemStats", default)]
    pub system_stats: SystemStats,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemStats {
    /// Total machine memory in bytes. Nodes that have not finished joining
    /// report 0 here.
    #[serde(default)]
    pub mem_total: u64,
}

/// `GET /pools/nodes`: health view of every node.
#[derive(Debug, Clone, Deserialize)]
pub struct NodesResponse {
    pub nodes: Vec<NodeHealth>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeHealth {
    /// `"healthy"`, `"warmup"`, `"unhealthy"`, ...
    pub status: String,
    #[serde(default)]
    pub hostname: Option<String>,
}

impl NodeHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}
