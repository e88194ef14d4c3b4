//! Domain models: endpoints, version capabilities, bucket and task shapes,
//! changes-feed types, and driver configuration.

pub mod bucket;
pub mod capabilities;
pub mod changes;
pub mod config;
pub mod endpoint;
pub mod task;

pub use bucket::{BucketInfo, BucketSpec};
pub use capabilities::{BucketAuthMode, ServerCapabilities, ServerVersion, VersionError};
pub use changes::{ChangeEntry, ChangeRev, ChangesBatch, DocumentExpectationSet, SequenceCursor};
pub use config::DriverConfig;
pub use endpoint::{ClusterEndpoint, Credentials, NodeIdentifier};
pub use task::{ClusterTask, TaskStatus};
