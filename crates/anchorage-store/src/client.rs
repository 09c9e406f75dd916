//! Content client: wraps a payload in its storage envelope and puts it in a
//! content store under a deadline.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use anchorage_core::{Cid, DeviceId, SensorData};

use crate::error::{Result, StoreError};
use crate::traits::ContentStore;

/// Default deadline for a single store round trip.
pub const DEFAULT_CONTENT_TIMEOUT: Duration = Duration::from_secs(30);

/// The document actually written to the content store.
///
/// Every upload carries a fresh `upload_nonce`, so submitting an identical
/// payload twice yields two distinct records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredPayload {
    pub device_id: DeviceId,
    pub data: SensorData,
    pub received_at_ms: u64,
    pub upload_nonce: String,
}

/// Result of a successful upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentRecord {
    pub cid: Cid,
    pub size: usize,
}

/// Uploads and fetches payload envelopes.
pub struct ContentClient<S> {
    store: S,
    timeout: Duration,
}

impl<S: ContentStore> ContentClient<S> {
    pub fn new(store: S) -> Self {
        Self::with_timeout(store, DEFAULT_CONTENT_TIMEOUT)
    }

    pub fn with_timeout(store: S, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Store the payload for `device_id` and return its content identifier.
    ///
    /// No retries; transport failures surface as `StoreError::Unavailable`
    /// and an exceeded deadline as `StoreError::Timeout`.
    pub async fn upload(&self, device_id: &DeviceId, data: &SensorData) -> Result<ContentRecord> {
        let envelope = StoredPayload {
            device_id: device_id.clone(),
            data: data.clone(),
            received_at_ms: now_millis(),
            upload_nonce: fresh_nonce(),
        };
        let bytes = serde_json::to_vec(&envelope)?;
        let size = bytes.len();

        let cid = tokio::time::timeout(self.timeout, self.store.put(Bytes::from(bytes)))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))??;

        if cid.is_empty() {
            return Err(StoreError::Rejected("store returned an empty identifier".into()));
        }

        tracing::debug!(device_id = %device_id, cid = %cid, size, "payload uploaded");
        Ok(ContentRecord { cid, size })
    }

    /// Fetch and decode an envelope previously written by `upload`.
    pub async fn fetch(&self, cid: &Cid) -> Result<StoredPayload> {
        let bytes = tokio::time::timeout(self.timeout, self.store.get(cid))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))??;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn fresh_nonce() -> String {
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    hex::encode(nonce)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryContentStore;
    use async_trait::async_trait;
    use serde_json::json;

    fn payload() -> SensorData {
        match json!({"temperature": 22.5, "humidity": 60, "timestamp": 1716000000}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn device() -> DeviceId {
        DeviceId::new("IOT-AB12CD34").unwrap()
    }

    #[tokio::test]
    async fn test_upload_then_fetch() {
        let client = ContentClient::new(MemoryContentStore::new());
        let record = client.upload(&device(), &payload()).await.unwrap();

        assert!(!record.cid.is_empty());
        let stored = client.fetch(&record.cid).await.unwrap();
        assert_eq!(stored.device_id, device());
        assert_eq!(stored.data, payload());
        assert_eq!(stored.upload_nonce.len(), 32);
    }

    #[tokio::test]
    async fn test_identical_payloads_get_distinct_cids() {
        let client = ContentClient::new(MemoryContentStore::new());
        let a = client.upload(&device(), &payload()).await.unwrap();
        let b = client.upload(&device(), &payload()).await.unwrap();
        assert_ne!(a.cid, b.cid);
        assert_eq!(client.store().len().await, 2);
    }

    #[tokio::test]
    async fn test_offline_store_is_unavailable() {
        let store = MemoryContentStore::new();
        store.set_offline(true);
        let client = ContentClient::new(store);

        let err = client.upload(&device(), &payload()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    struct StalledStore;

    #[async_trait]
    impl ContentStore for StalledStore {
        async fn put(&self, _bytes: Bytes) -> Result<Cid> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Cid::new("never"))
        }

        async fn get(&self, cid: &Cid) -> Result<Bytes> {
            Err(StoreError::NotFound(cid.clone()))
        }
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let client = ContentClient::with_timeout(StalledStore, Duration::from_millis(20));
        let err = client.upload(&device(), &payload()).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
        assert!(err.is_unavailable());
    }
}
