//! REST client for the replication data plane (Sync Gateway / listener).

pub mod client;
pub mod error;
pub mod multipart;

pub use client::{DataPlaneClient, FetchedDoc, SyncFlavor};
pub use error::DataPlaneError;
