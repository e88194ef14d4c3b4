use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client as ReqwestClient, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::error::ControlPlaneError;
use crate::domain::models::{ClusterEndpoint, DriverConfig, ServerVersion};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Authenticated request/response wrapper over one cluster's admin REST API.
///
/// The client is immutably configured at construction; components that talk
/// to the same endpoint each hold their own clone (the underlying connection
/// pool is shared). Every call maps a non-2xx status to a typed
/// [`ControlPlaneError::Status`] carrying the body, except through the `_raw`
/// variants used by callers that interpret non-2xx themselves.
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    http: ReqwestClient,
    endpoint: ClusterEndpoint,
}

impl ControlPlaneClient {
    pub fn new(
        endpoint: ClusterEndpoint,
        config: &DriverConfig,
    ) -> Result<Self, ControlPlaneError> {
        let http = ReqwestClient::builder()
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .danger_accept_invalid_certs(endpoint.accepts_invalid_certs())
            .build()?;

        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &ClusterEndpoint {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.base_url(), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let credentials = self.endpoint.credentials();
        self.http
            .request(method, self.url(path))
            .basic_auth(&credentials.username, Some(&credentials.password))
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ControlPlaneError> {
        debug!(url = %self.url(path), "GET");
        let response = self.request(reqwest::Method::GET, path).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    /// GET `path`, returning the status code without treating non-2xx as an
    /// error. Connection failures still surface as [`ControlPlaneError::Network`].
    pub async fn get_raw(&self, path: &str) -> Result<StatusCode, ControlPlaneError> {
        debug!(url = %self.url(path), "GET (raw)");
        let response = self.request(reqwest::Method::GET, path).send().await?;
        Ok(response.status())
    }

    /// POST a pre-built urlencoded body.
    ///
    /// Topology-change bodies carry `ns_1@host` node lists whose exact bytes
    /// the rebalance controller expects; they are rendered by the caller
    /// rather than run through a form serializer.
    pub async fn post_form(&self, path: &str, body: String) -> Result<(), ControlPlaneError> {
        debug!(url = %self.url(path), body = %redact_form_secrets(&body), "POST");
        let response = self
            .request(reqwest::Method::POST, path)
            .header(CONTENT_TYPE, FORM_URLENCODED)
            .body(body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// POST a pre-built urlencoded body, returning the status code without
    /// treating non-2xx as an error.
    pub async fn post_form_raw(
        &self,
        path: &str,
        body: String,
    ) -> Result<StatusCode, ControlPlaneError> {
        debug!(url = %self.url(path), body = %redact_form_secrets(&body), "POST (raw)");
        let response = self
            .request(reqwest::Method::POST, path)
            .header(CONTENT_TYPE, FORM_URLENCODED)
            .body(body)
            .send()
            .await?;
        Ok(response.status())
    }

    /// PUT a pre-built urlencoded body.
    pub async fn put_form(&self, path: &str, body: String) -> Result<(), ControlPlaneError> {
        debug!(url = %self.url(path), "PUT");
        let response = self
            .request(reqwest::Method::PUT, path)
            .header(CONTENT_TYPE, FORM_URLENCODED)
            .body(body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<(), ControlPlaneError> {
        debug!(url = %self.url(path), "DELETE");
        let response = self.request(reqwest::Method::DELETE, path).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Probe `GET /pools` for the running server version.
    pub async fn server_version(&self) -> Result<ServerVersion, ControlPlaneError> {
        let pools: serde_json::Value = self.get_json("/pools").await?;
        let raw = pools
            .get("implementationVersion")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ControlPlaneError::Payload {
                url: self.url("/pools"),
                reason: "missing implementationVersion".to_string(),
            })?;

        ServerVersion::parse(raw).map_err(|err| ControlPlaneError::Payload {
            url: self.url("/pools"),
            reason: err.to_string(),
        })
    }

    async fn check(response: Response) -> Result<Response, ControlPlaneError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_string());
        warn!(%status, %url, %body, "admin API error");
        Err(ControlPlaneError::Status { status, url, body })
    }
}

/// Mask credential values in a urlencoded body before it reaches a log
/// field. Add-node and legacy bucket-create bodies carry admin and bucket
/// passwords.
fn redact_form_secrets(body: &str) -> String {
    body.split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if key.to_ascii_lowercase().contains("password") => {
                format!("{key}=***")
            }
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}
