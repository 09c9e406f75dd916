//! Storage traits: the abstract interfaces for device keys and payload content.
//!
//! These traits keep the pipeline backend-agnostic. Implementations include
//! in-memory (tests), SQLite (device registry) and IPFS (content).

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use anchorage_core::{Cid, DeviceId, DevicePublicKey};

use crate::error::{RegistryError, RegistryResult, Result};

/// The device registry: device identifier to enrolled public key.
///
/// # Design Notes
///
/// - **Last write wins**: re-registering a device silently replaces its key.
/// - **Serialized access**: implementations guard their map so concurrent
///   `register`/`lookup` calls never lose updates.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Store or overwrite the key for a device.
    ///
    /// Fails with `InvalidInput` if the key is empty.
    async fn register(&self, device_id: &DeviceId, public_key: &DevicePublicKey)
        -> RegistryResult<()>;

    /// Get the enrolled key, or `NotFound`.
    async fn lookup(&self, device_id: &DeviceId) -> RegistryResult<DevicePublicKey>;

    /// Check whether a device is enrolled.
    async fn contains(&self, device_id: &DeviceId) -> RegistryResult<bool> {
        match self.lookup(device_id).await {
            Ok(_) => Ok(true),
            Err(RegistryError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// All enrolled devices, ordered by identifier.
    async fn list_devices(&self) -> RegistryResult<Vec<DeviceId>>;
}

/// A content-addressed blob store.
///
/// `put` must return an identifier derived from the stored bytes. Transport
/// failures surface as `StoreError::Unavailable`; implementations do not retry.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store bytes, returning their content identifier.
    async fn put(&self, bytes: Bytes) -> Result<Cid>;

    /// Retrieve bytes previously stored under `cid`.
    async fn get(&self, cid: &Cid) -> Result<Bytes>;
}

/// Shared registries delegate to the inner value.
#[async_trait]
impl<T: DeviceRegistry + ?Sized> DeviceRegistry for Arc<T> {
    async fn register(
        &self,
        device_id: &DeviceId,
        public_key: &DevicePublicKey,
    ) -> RegistryResult<()> {
        (**self).register(device_id, public_key).await
    }

    async fn lookup(&self, device_id: &DeviceId) -> RegistryResult<DevicePublicKey> {
        (**self).lookup(device_id).await
    }

    async fn contains(&self, device_id: &DeviceId) -> RegistryResult<bool> {
        (**self).contains(device_id).await
    }

    async fn list_devices(&self) -> RegistryResult<Vec<DeviceId>> {
        (**self).list_devices().await
    }
}

/// Shared stores delegate to the inner value.
#[async_trait]
impl<T: ContentStore + ?Sized> ContentStore for Arc<T> {
    async fn put(&self, bytes: Bytes) -> Result<Cid> {
        (**self).put(bytes).await
    }

    async fn get(&self, cid: &Cid) -> Result<Bytes> {
        (**self).get(cid).await
    }
}

/// Reject registrations that carry no key material.
pub(crate) fn validate_registration(public_key: &DevicePublicKey) -> RegistryResult<()> {
    if public_key.is_empty() {
        return Err(RegistryError::InvalidInput(
            "public_key must not be empty".into(),
        ));
    }
    Ok(())
}
