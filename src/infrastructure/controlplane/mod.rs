//! Admin REST ("control plane") client for Couchbase Server.

pub mod client;
pub mod error;
pub mod types;

pub use client::ControlPlaneClient;
pub use error::ControlPlaneError;
pub use types::{NodeHealth, NodeInfo, NodesResponse, PoolsDefault, SystemStats};
