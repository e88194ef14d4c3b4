use std::fmt;

use serde::{Deserialize, Serialize};

/// Admin credentials for a cluster endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new("Administrator", "password")
    }
}

/// An admin REST endpoint of one cluster node.
///
/// Immutable once constructed; every component that issues requests against
/// the endpoint holds its own copy. The TLS verification toggle exists for
/// clusters running self-signed certificates on the secure admin port.
#[derive(Debug, Clone)]
pub struct ClusterEndpoint {
    base_url: String,
    credentials: Credentials,
    accept_invalid_certs: bool,
}

impl ClusterEndpoint {
    pub fn new(url: impl Into<String>, credentials: Credentials) -> Self {
        let mut base_url = url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            credentials,
            accept_invalid_certs: false,
        }
    }

    /// Accept self-signed certificates when talking to this endpoint.
    pub fn with_tls_verification_disabled(mut self) -> Self {
        self.accept_invalid_certs = true;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn accepts_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }

    /// The normalized node address behind this endpoint.
    pub fn node(&self) -> NodeIdentifier {
        NodeIdentifier::from_url(&self.base_url)
    }
}

impl fmt::Display for ClusterEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_url)
    }
}

/// A normalized node address: the raw endpoint URL with scheme, port and any
/// trailing path stripped.
///
/// Used as the set-membership key when building known-node lists for
/// rebalance. Two differently-formatted URLs pointing at the same host must
/// normalize identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdentifier(String);

impl NodeIdentifier {
    pub fn from_url(raw: &str) -> Self {
        let host = raw.trim();
        let host = host
            .strip_prefix("https://")
            .or_else(|| host.strip_prefix("http://"))
            .unwrap_or(host);
        let host = host.split('/').next().unwrap_or(host);
        let host = match host.rsplit_once(':') {
            Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
                name
            }
            _ => host,
        };
        Self(host.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The cluster-internal `ns_1@host` form used in topology-change bodies.
    pub fn otp_name(&self) -> String {
        format!("ns_1@{}", self.0)
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
