//! In-memory implementations of the storage traits.
//!
//! These are primarily for testing. They have the same semantics as the
//! SQLite and IPFS backends but keep everything in memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use anchorage_core::{Cid, DeviceId, DevicePublicKey, Sha256Digest};

use crate::error::{RegistryError, RegistryResult, Result, StoreError};
use crate::traits::{validate_registration, ContentStore, DeviceRegistry};

/// In-memory device registry.
///
/// Thread-safe via an async RwLock; writers are serialized.
#[derive(Default)]
pub struct MemoryRegistry {
    devices: RwLock<HashMap<DeviceId, DevicePublicKey>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of enrolled devices.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}

#[async_trait]
impl DeviceRegistry for MemoryRegistry {
    async fn register(
        &self,
        device_id: &DeviceId,
        public_key: &DevicePublicKey,
    ) -> RegistryResult<()> {
        validate_registration(public_key)?;
        let mut devices = self.devices.write().await;
        if devices.insert(device_id.clone(), public_key.clone()).is_some() {
            tracing::warn!(device_id = %device_id, "device re-registered, previous key replaced");
        }
        Ok(())
    }

    async fn lookup(&self, device_id: &DeviceId) -> RegistryResult<DevicePublicKey> {
        let devices = self.devices.read().await;
        devices
            .get(device_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(device_id.clone()))
    }

    async fn list_devices(&self) -> RegistryResult<Vec<DeviceId>> {
        let devices = self.devices.read().await;
        let mut ids: Vec<DeviceId> = devices.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// In-memory content-addressed store.
///
/// Identifiers are CIDv1 (raw, sha2-256) of the stored bytes. The store can be
/// switched offline to exercise transport failures.
#[derive(Default)]
pub struct MemoryContentStore {
    blobs: RwLock<HashMap<Cid, Bytes>>,
    offline: AtomicBool,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `Unavailable` (or recover).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of distinct blobs held.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, bytes: Bytes) -> Result<Cid> {
        self.check_online()?;
        let cid = Cid::new(Sha256Digest::hash(&bytes).to_cid());
        self.blobs.write().await.insert(cid.clone(), bytes);
        Ok(cid)
    }

    async fn get(&self, cid: &Cid) -> Result<Bytes> {
        self.check_online()?;
        self.blobs
            .read()
            .await
            .get(cid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(cid.clone()))
    }
}
