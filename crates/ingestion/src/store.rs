//! Remote object store access.
//!
//! The pipeline needs two operations from the archive host: a paginated
//! listing under a prefix and a fetch of one named object. [`HttpObjectStore`]
//! speaks the S3 v1 listing protocol served by the public bucket;
//! `MemoryObjectStore` (feature `test-util`) serves the same contract from
//! memory.

use async_trait::async_trait;
use bytes::Bytes;
use liquidation_core::config::RemoteConfig;
use liquidation_core::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[cfg(any(test, feature = "test-util"))]
mod memory;
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryObjectStore;

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Object keys on this page.
    pub keys: Vec<String>,
    /// Whether more keys follow.
    pub is_truncated: bool,
    /// Marker to resume from, when the store provides one.
    pub next_marker: Option<String>,
}

impl ListPage {
    /// Marker for the next request: explicit marker, else the last key.
    pub fn continuation(&self) -> Option<&str> {
        if !self.is_truncated {
            return None;
        }
        self.next_marker
            .as_deref()
            .or_else(|| self.keys.last().map(String::as_str))
    }
}

/// Minimal object store contract used by the sync pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// List one page of keys directly under `prefix`, starting after `marker`.
    async fn list_objects(&self, prefix: &str, marker: Option<&str>) -> Result<ListPage>;

    /// Fetch one object. Missing objects and non-success responses are errors.
    async fn get_object(&self, key: &str) -> Result<Bytes>;
}

/// S3 `ListBucketResult` document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    /// Bucket name; its absence means the body is not a listing.
    #[allow(dead_code)]
    name: String,
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    next_marker: Option<String>,
    #[serde(default)]
    contents: Vec<ListEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListEntry {
    key: String,
}

/// Parse an S3 v1 listing body.
pub fn parse_list_page(xml: &str) -> Result<ListPage> {
    let result: ListBucketResult = quick_xml::de::from_str(xml)
        .map_err(|e| Error::catalog(format!("malformed listing response: {}", e)))?;

    Ok(ListPage {
        keys: result.contents.into_iter().map(|c| c.key).collect(),
        is_truncated: result.is_truncated,
        next_marker: result.next_marker.filter(|m| !m.is_empty()),
    })
}

/// Object store backed by the public HTTP endpoints of the archive bucket.
#[derive(Clone)]
pub struct HttpObjectStore {
    client: Client,
    list_endpoint: String,
    download_endpoint: String,
}

impl HttpObjectStore {
    /// Create a store from the remote configuration.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            list_endpoint: config.list_endpoint.trim_end_matches('/').to_string(),
            download_endpoint: config.download_endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.download_endpoint, key.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn list_objects(&self, prefix: &str, marker: Option<&str>) -> Result<ListPage> {
        let mut query = vec![("delimiter", "/"), ("prefix", prefix)];
        if let Some(marker) = marker {
            query.push(("marker", marker));
        }

        let response = self
            .client
            .get(&self.list_endpoint)
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::catalog(format!("listing {} failed: {}", prefix, e)))?;

        if !response.status().is_success() {
            return Err(Error::catalog(format!(
                "HTTP {} listing {}",
                response.status(),
                prefix
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::catalog(format!("reading listing {} failed: {}", prefix, e)))?;

        parse_list_page(&body)
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let url = self.object_url(key);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::download(format!("GET {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::download(format!("HTTP {} for {}", response.status(), url)));
        }

        response
            .bytes()
            .await
            .map_err(|e| Error::download(format!("reading body of {} failed: {}", url, e)))
    }
}
