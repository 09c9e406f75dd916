//! IPFS-backed content store, speaking the Kubo HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use anchorage_core::Cid;

use crate::error::{Result, StoreError};
use crate::traits::ContentStore;

/// Content store backed by an IPFS node's `/api/v0` endpoints.
///
/// Uploads are pinned and addressed with CIDv1 so identifiers match the
/// in-memory store.
pub struct IpfsContentStore {
    client: reqwest::Client,
    api_url: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

impl IpfsContentStore {
    /// Build a client for the node at `api_url` (e.g. `http://127.0.0.1:5001`).
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v0/{}", self.api_url, path)
    }

    fn transport_error(&self, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout(self.timeout)
        } else {
            StoreError::Unavailable(e.to_string())
        }
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(StoreError::Unavailable(format!("{}: {}", status, body)))
        } else {
            Err(StoreError::Rejected(format!("{}: {}", status, body)))
        }
    }
}

#[async_trait]
impl ContentStore for IpfsContentStore {
    async fn put(&self, bytes: Bytes) -> Result<Cid> {
        let size = bytes.len();
        let form = Form::new().part("file", Part::bytes(bytes.to_vec()).file_name("payload.json"));

        let response = self
            .client
            .post(self.endpoint("add"))
            .query(&[("cid-version", "1"), ("pin", "true")])
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response = self.check_status(response).await?;

        let added: AddResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Rejected(format!("malformed add response: {}", e)))?;
        if added.hash.is_empty() {
            return Err(StoreError::Rejected("add response carried no hash".into()));
        }

        tracing::debug!(cid = %added.hash, size, "content added to ipfs");
        Ok(Cid::new(added.hash))
    }

    async fn get(&self, cid: &Cid) -> Result<Bytes> {
        let response = self
            .client
            .post(self.endpoint("cat"))
            .query(&[("arg", cid.as_str())])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        // Gateways in front of the node answer 404 for unknown content.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(cid.clone()));
        }
        let response = self.check_status(response).await?;

        response.bytes().await.map_err(|e| self.transport_error(e))
    }
}
