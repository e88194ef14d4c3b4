use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised by the admin REST client.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// Connection-level failure: refused, reset, timed out, DNS.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        status: StatusCode,
        url: String,
        body: String,
    },

    /// The server answered 2xx but the payload was not what the caller
    /// expected.
    #[error("unexpected payload from {url}: {reason}")]
    Payload { url: String, reason: String },
}

impl ControlPlaneError {
    /// Transient errors are retried inside poll loops and surfaced only
    /// after the deadline; everything else propagates immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            // Body-decode failures travel as reqwest errors too; a response
            // that arrived but cannot be parsed will not parse next time
            // either.
            Self::Network(err) => !err.is_decode(),
            Self::Status { status, .. } => status.is_server_error(),
            Self::Payload { .. } => false,
        }
    }

    /// True when the failure proves nothing is listening on the endpoint.
    /// The server-shutdown probe treats this as its success signal.
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Network(err) => err.is_connect() || err.is_timeout(),
            _ => false,
        }
    }
}
