//! Convergence orchestration built on the shared [`poller::Poller`].

pub mod buckets;
pub mod documents;
pub mod health;
pub mod poller;
pub mod topology;

pub use buckets::BucketManager;
pub use documents::DocumentVerifier;
pub use health::ClusterHealth;
pub use poller::{PollError, Poller, Retryable, Step};
pub use topology::TopologyService;
