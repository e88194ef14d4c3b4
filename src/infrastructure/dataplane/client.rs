use reqwest::Client as ReqwestClient;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::error::DataPlaneError;
use super::multipart::parse_bulk_get_body;
use crate::domain::models::{ChangesBatch, DriverConfig, SequenceCursor};

/// The two sync-layer flavors the driver can interrogate. They expose the
/// same logical operations behind different request and response shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFlavor {
    /// Sync Gateway: `_bulk_get` (multipart), POST `_changes`.
    SyncGateway,
    /// Couchbase Lite listener: `_all_docs` key listing, GET `_changes`.
    Listener,
}

/// One row of a normalized bulk fetch, regardless of flavor.
#[derive(Debug, Clone)]
pub struct FetchedDoc {
    pub id: String,
    pub rev: Option<String>,
    pub missing: bool,
}

/// REST client for the replication data plane (Sync Gateway or a Couchbase
/// Lite listener).
#[derive(Debug, Clone)]
pub struct DataPlaneClient {
    http: ReqwestClient,
    base_url: String,
}

impl DataPlaneClient {
    pub fn new(base_url: impl Into<String>, config: &DriverConfig) -> Result<Self, DataPlaneError> {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        let http = ReqwestClient::builder()
            .timeout(config.request_timeout())
            .tcp_nodelay(true)
            .build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Classify the server behind the base URL from its root payload.
    pub async fn flavor(&self) -> Result<SyncFlavor, DataPlaneError> {
        let url = format!("{}/", self.base_url);
        let root: Value = self.get_json(&url).await?;

        if let Some(vendor) = root.pointer("/vendor/name").and_then(Value::as_str) {
            if vendor.contains("Sync Gateway") {
                return Ok(SyncFlavor::SyncGateway);
            }
            if vendor.contains("Couchbase Lite") {
                return Ok(SyncFlavor::Listener);
            }
            return Err(DataPlaneError::UnknownFlavor(vendor.to_string()));
        }
        // Android listener has no vendor block, just a welcome marker.
        if root.get("CBLite").is_some() {
            return Ok(SyncFlavor::Listener);
        }

        Err(DataPlaneError::UnknownFlavor(root.to_string()))
    }

    /// Bulk-fetch the given document ids, normalized across flavors.
    ///
    /// The flavor is probed once per verification call by the caller, not on
    /// every poll round. Listener rows report a missing document either as an
    /// `error` row (`{"key": "...", "error": "not_found"}`) or as an empty
    /// `value` object; Sync Gateway reports it as an `error` document inside
    /// the multipart body.
    pub async fn fetch_docs(
        &self,
        flavor: SyncFlavor,
        db: &str,
        ids: &[String],
    ) -> Result<Vec<FetchedDoc>, DataPlaneError> {
        match flavor {
            SyncFlavor::Listener => self.fetch_docs_all_docs(db, ids).await,
            SyncFlavor::SyncGateway => self.fetch_docs_bulk_get(db, ids).await,
        }
    }

    async fn fetch_docs_all_docs(
        &self,
        db: &str,
        ids: &[String],
    ) -> Result<Vec<FetchedDoc>, DataPlaneError> {
        let url = format!("{}/{}/_all_docs", self.base_url, db);
        let body = json!({ "keys": ids });
        debug!(%url, keys = ids.len(), "POST _all_docs");

        let response = self.http.post(&url).json(&body).send().await?;
        let response = Self::check(response).await?;
        let payload: Value = response.json().await?;

        let rows = payload
            .get("rows")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(rows
            .iter()
            .map(|row| {
                let id = row
                    .get("id")
                    .or_else(|| row.get("key"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let rev = row
                    .pointer("/value/rev")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let empty_value = row
                    .get("value")
                    .and_then(Value::as_object)
                    .is_some_and(|v| v.is_empty());
                let missing = row.get("error").is_some() || empty_value;
                FetchedDoc { id, rev, missing }
            })
            .collect())
    }

    async fn fetch_docs_bulk_get(
        &self,
        db: &str,
        ids: &[String],
    ) -> Result<Vec<FetchedDoc>, DataPlaneError> {
        let url = format!("{}/{}/_bulk_get", self.base_url, db);
        let docs: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
        let body = json!({ "docs": docs });
        debug!(%url, keys = ids.len(), "POST _bulk_get");

        let response = self.http.post(&url).json(&body).send().await?;
        let response = Self::check(response).await?;
        let text = response.text().await?;

        Ok(parse_bulk_get_body(&text)
            .iter()
            .map(|doc| {
                let missing = doc.get("error").is_some();
                let id = doc
                    .get("_id")
                    .or_else(|| doc.get("id"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let rev = doc
                    .get("_rev")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                FetchedDoc { id, rev, missing }
            })
            .collect())
    }

    /// Pull one longpoll batch of the changes feed starting after `since`.
    pub async fn changes(
        &self,
        flavor: SyncFlavor,
        db: &str,
        since: SequenceCursor,
    ) -> Result<ChangesBatch, DataPlaneError> {
        let text = match flavor {
            SyncFlavor::Listener => {
                let url = format!(
                    "{}/{}/_changes?feed=longpoll&since={}",
                    self.base_url, db, since
                );
                debug!(%url, "GET _changes");
                let response = self.http.get(&url).send().await?;
                Self::check(response).await?.text().await?
            }
            SyncFlavor::SyncGateway => {
                let url = format!("{}/{}/_changes", self.base_url, db);
                let body = json!({ "feed": "longpoll", "since": since.value() });
                debug!(%url, since = since.value(), "POST _changes");
                let response = self.http.post(&url).json(&body).send().await?;
                Self::check(response).await?.text().await?
            }
        };

        serde_json::from_str(&text).map_err(|source| DataPlaneError::Decode {
            context: "changes batch".to_string(),
            source,
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value, DataPlaneError> {
        debug!(%url, "GET");
        let response = self.http.get(url).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, DataPlaneError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_string());
        warn!(%status, %url, %body, "data plane error");
        Err(DataPlaneError::Status { status, url, body })
    }
}
