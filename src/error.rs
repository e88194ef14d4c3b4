use std::time::Duration;

use thiserror::Error;

use crate::infrastructure::controlplane::ControlPlaneError;
use crate::infrastructure::dataplane::DataPlaneError;
use crate::services::poller::{PollError, Retryable};

/// Crate-level error taxonomy.
///
/// Four families: transport errors wrapped from the two REST clients
/// (transient members are retried inside poll loops, nowhere else),
/// configuration/invariant errors that are fatal on first sight,
/// protocol-invariant violations that must never be retried, and timeouts
/// raised only when a bounded poll exceeds its deadline.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("control plane: {0}")]
    ControlPlane(#[from] ControlPlaneError),

    #[error("data plane: {0}")]
    DataPlane(#[from] DataPlaneError),

    /// Every node reported `mem_total = 0`: a misconfigured cluster, not a
    /// not-yet-ready one.
    #[error("no node reported a non-zero mem_total; cluster RAM stats are unusable")]
    NoRamReported,

    /// The bounded bucket-deletion retry gave up.
    #[error("could not delete buckets after {attempts} rounds; still present: {remaining:?}")]
    DeleteRetriesExhausted {
        attempts: u32,
        remaining: Vec<String>,
    },

    /// The running server is not the version the caller demanded.
    #[error("unexpected server version; expected {expected}, running {running}")]
    VersionMismatch { expected: String, running: String },

    /// Admin endpoints answered on hosts that were supposed to be torn down.
    #[error("services still running: {0:?}")]
    ServicesStillRunning(Vec<String>),

    /// The changes feed emitted a sequence number twice. The feed is an
    /// append-only stream; a repeat is a protocol violation, never retried.
    #[error("duplicate sequence number {seq} in changes feed (doc {doc_id:?})")]
    DuplicateSequence { seq: u64, doc_id: String },

    /// A bounded poll loop ran out of deadline.
    #[error("{operation}: not converged after {elapsed:?} (deadline {deadline:?})")]
    Timeout {
        operation: String,
        deadline: Duration,
        elapsed: Duration,
    },

    /// The caller's shutdown signal fired mid-poll.
    #[error("{operation}: cancelled by shutdown signal")]
    Cancelled { operation: String },
}

impl Retryable for ControlPlaneError {
    fn is_transient(&self) -> bool {
        ControlPlaneError::is_transient(self)
    }
}

impl Retryable for DataPlaneError {
    fn is_transient(&self) -> bool {
        DataPlaneError::is_transient(self)
    }
}

impl Retryable for DriverError {
    fn is_transient(&self) -> bool {
        match self {
            Self::ControlPlane(err) => err.is_transient(),
            Self::DataPlane(err) => err.is_transient(),
            _ => false,
        }
    }
}

impl From<PollError<ControlPlaneError>> for DriverError {
    fn from(err: PollError<ControlPlaneError>) -> Self {
        match err {
            PollError::Timeout {
                operation,
                deadline,
                elapsed,
            } => Self::Timeout {
                operation,
                deadline,
                elapsed,
            },
            PollError::Cancelled { operation } => Self::Cancelled { operation },
            PollError::Fatal(inner) => Self::ControlPlane(inner),
        }
    }
}

impl From<PollError<DataPlaneError>> for DriverError {
    fn from(err: PollError<DataPlaneError>) -> Self {
        match err {
            PollError::Timeout {
                operation,
                deadline,
                elapsed,
            } => Self::Timeout {
                operation,
                deadline,
                elapsed,
            },
            PollError::Cancelled { operation } => Self::Cancelled { operation },
            PollError::Fatal(inner) => Self::DataPlane(inner),
        }
    }
}

impl From<PollError<DriverError>> for DriverError {
    fn from(err: PollError<DriverError>) -> Self {
        match err {
            PollError::Timeout {
                operation,
                deadline,
                elapsed,
            } => Self::Timeout {
                operation,
                deadline,
                elapsed,
            },
            PollError::Cancelled { operation } => Self::Cancelled { operation },
            PollError::Fatal(inner) => inner,
        }
    }
}
