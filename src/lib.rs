//! cbdrive - Couchbase Cluster Convergence Driver
//!
//! cbdrive drives a Couchbase Server cluster and its sync layer (Sync
//! Gateway or a Couchbase Lite listener) through asynchronous operations,
//! polling until the cluster actually reaches the requested state: bucket
//! creation and teardown, node membership changes with rebalance, and
//! document-level replication convergence.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Pure domain models (endpoints, versions,
//!   bucket specs, changes-feed records, configuration)
//! - **Service Layer** (`services`): Convergence orchestration built on a
//!   shared deadline-bounded poller
//! - **Infrastructure Layer** (`infrastructure`): REST clients for the
//!   cluster control plane and the replication data plane, config loading,
//!   logging
//!
//! # Example
//!
//! ```ignore
//! use cbdrive::{BucketManager, ClusterEndpoint, ControlPlaneClient, Credentials, DriverConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DriverConfig::default();
//!     let endpoint = ClusterEndpoint::new("http://localhost:8091", Credentials::default());
//!     let client = ControlPlaneClient::new(endpoint, &config)?;
//!     let buckets = BucketManager::detect(client, config).await?;
//!     buckets.create_buckets(&["data-bucket".to_string()]).await?;
//!     Ok(())
//! }
//! ```

pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    BucketAuthMode, BucketInfo, BucketSpec, ChangesBatch, ClusterEndpoint, ClusterTask,
    Credentials, DocumentExpectationSet, DriverConfig, NodeIdentifier, SequenceCursor,
    ServerCapabilities, ServerVersion, TaskStatus,
};
pub use error::DriverError;
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::controlplane::{ControlPlaneClient, ControlPlaneError};
pub use infrastructure::dataplane::{DataPlaneClient, DataPlaneError, FetchedDoc, SyncFlavor};
pub use services::{
    BucketManager, ClusterHealth, DocumentVerifier, PollError, Poller, Retryable, Step,
    TopologyService,
};
