use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised by the sync-layer REST client.
#[derive(Debug, Error)]
pub enum DataPlaneError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}: {body}")]
    Status {
        status: StatusCode,
        url: String,
        body: String,
    },

    #[error("failed to decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unrecognized server flavor: {0}")]
    UnknownFlavor(String),
}

impl DataPlaneError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(err) => !err.is_decode(),
            Self::Status { status, .. } => status.is_server_error(),
            Self::Decode { .. } | Self::UnknownFlavor(_) => false,
        }
    }
}
