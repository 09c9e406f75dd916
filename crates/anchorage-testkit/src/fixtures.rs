//! Test fixtures and helpers.
//!
//! Common setup code for pipeline tests. Everything here runs in process.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};

use anchorage::{Pipeline, PipelineConfig};
use anchorage_core::{
    payload_digest, Address, Cid, DeviceId, DeviceKeypair, DevicePublicKey, SensorData,
};
use anchorage_ledger::{AccountKey, AnchorService, AnchorSettings, MemoryLedger};
use anchorage_store::{ContentClient, ContentStore, MemoryContentStore, MemoryRegistry, Result};

/// Chain id of the in-memory ledger used by fixtures.
pub const TEST_CHAIN_ID: u64 = 1337;

/// Service account secret used by fixtures.
pub const TEST_ACCOUNT_SEED: [u8; 32] = [0x5a; 32];

/// `{"temperature": 22.5, "humidity": 60, "timestamp": 1716000000}`
pub fn reference_payload() -> SensorData {
    object(json!({"temperature": 22.5, "humidity": 60, "timestamp": 1716000000}))
}

/// Unwrap a JSON object literal into a payload.
///
/// # Panics
///
/// If `value` is not an object.
pub fn object(value: Value) -> SensorData {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// A device with its own signing key, signing exactly as firmware would.
#[derive(Clone, Debug)]
pub struct TestDevice {
    pub id: DeviceId,
    pub keypair: DeviceKeypair,
}

impl TestDevice {
    /// A device with a random key.
    ///
    /// # Panics
    ///
    /// If `id` is blank.
    pub fn new(id: &str) -> Self {
        Self {
            id: DeviceId::new(id).expect("device id"),
            keypair: DeviceKeypair::generate(),
        }
    }

    /// A device with a deterministic key.
    ///
    /// # Panics
    ///
    /// If `id` is blank or `seed` is not a valid secp256k1 scalar.
    pub fn with_seed(id: &str, seed: [u8; 32]) -> Self {
        Self {
            id: DeviceId::new(id).expect("device id"),
            keypair: DeviceKeypair::from_seed(&seed).expect("seed is a valid scalar"),
        }
    }

    pub fn public_key(&self) -> DevicePublicKey {
        self.keypair.public_key()
    }

    /// Base64 signature over the canonical digest of `data`.
    pub fn sign(&self, data: &SensorData) -> String {
        self.keypair
            .sign_digest(&payload_digest(data))
            .expect("prehash signing")
            .to_base64()
    }
}

/// Content store wrapper that counts calls, to prove a stage was never reached.
#[derive(Default)]
pub struct CountingContentStore {
    inner: MemoryContentStore,
    puts: AtomicUsize,
    gets: AtomicUsize,
}

impl CountingContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryContentStore {
        &self.inner
    }

    /// Calls to `put`, including failed ones.
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.set_offline(offline);
    }
}

#[async_trait]
impl ContentStore for CountingContentStore {
    async fn put(&self, bytes: Bytes) -> Result<Cid> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(bytes).await
    }

    async fn get(&self, cid: &Cid) -> Result<Bytes> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(cid).await
    }
}

/// Pipeline over the in-memory registry, a counting store and the
/// in-memory ledger node.
pub type TestPipeline = Pipeline<MemoryRegistry, Arc<CountingContentStore>, Arc<MemoryLedger>>;

/// A wired pipeline plus handles on its backends.
pub struct PipelineFixture {
    pub pipeline: TestPipeline,
    pub store: Arc<CountingContentStore>,
    pub ledger: Arc<MemoryLedger>,
}

impl PipelineFixture {
    /// Default pipeline configuration, with receipt waits short enough for tests.
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default(), fast_settings())
    }

    pub fn with_config(config: PipelineConfig, settings: AnchorSettings) -> Self {
        let store = Arc::new(CountingContentStore::new());
        let ledger = Arc::new(MemoryLedger::new(
            TEST_CHAIN_ID,
            Address::from_bytes([0xcc; 20]),
        ));
        let key = AccountKey::from_slice(&TEST_ACCOUNT_SEED).expect("fixture account key");
        let anchor = AnchorService::new(
            ledger.clone(),
            key,
            ledger.contract(),
            TEST_CHAIN_ID,
            settings,
        );
        let pipeline = Pipeline::new(
            MemoryRegistry::new(),
            ContentClient::new(store.clone()),
            anchor,
            config,
        );
        Self {
            pipeline,
            store,
            ledger,
        }
    }

    /// Register `device` with the pipeline.
    ///
    /// # Panics
    ///
    /// If registration fails.
    pub async fn enroll(&self, device: &TestDevice) {
        self.pipeline
            .register_device(&device.id, &device.public_key())
            .await
            .expect("device registration");
    }
}

impl Default for PipelineFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Anchor settings with millisecond-scale receipt polling.
pub fn fast_settings() -> AnchorSettings {
    AnchorSettings {
        receipt_timeout: Duration::from_millis(250),
        poll_interval: Duration::from_millis(5),
        ..AnchorSettings::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_devices_are_deterministic() {
        let a = TestDevice::with_seed("IOT-1", [3; 32]);
        let b = TestDevice::with_seed("IOT-2", [3; 32]);
        assert_eq!(a.public_key(), b.public_key());
        let data = reference_payload();
        assert!(anchorage::verify_with_key(&a.public_key(), &data, &b.sign(&data)));
    }

    #[tokio::test]
    async fn test_counting_store_counts_failures() {
        let store = CountingContentStore::new();
        store.set_offline(true);
        assert!(store.put(Bytes::from_static(b"x")).await.is_err());
        assert_eq!(store.puts(), 1);
        assert_eq!(store.gets(), 0);
    }
}
