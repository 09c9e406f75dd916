//! Signature verification against the device registry.

use anchorage_core::{payload_digest, DeviceId, DevicePublicKey, DeviceSignature, SensorData};
use anchorage_store::DeviceRegistry;

/// Checks device signatures over canonical payload digests.
///
/// Every failure cause (unknown device, malformed key, undecodable or wrong
/// signature) collapses to `false`.
pub struct SignatureVerifier<R> {
    registry: R,
}

impl<R: DeviceRegistry> SignatureVerifier<R> {
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Whether `signature` (base64) over `data` was made by the key
    /// registered for `device_id`.
    pub async fn verify(&self, device_id: &DeviceId, data: &SensorData, signature: &str) -> bool {
        match self.registry.lookup(device_id).await {
            Ok(key) => verify_with_key(&key, data, signature),
            Err(_) => false,
        }
    }
}

/// Verify against a known key without touching the registry.
pub fn verify_with_key(key: &DevicePublicKey, data: &SensorData, signature: &str) -> bool {
    let Ok(signature) = DeviceSignature::from_base64(signature) else {
        return false;
    };
    key.verify_digest(&payload_digest(data), &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchorage_core::DeviceKeypair;
    use anchorage_store::MemoryRegistry;
    use serde_json::json;

    fn payload() -> SensorData {
        match json!({"temperature": 22.5, "humidity": 60, "timestamp": 1716000000}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    async fn setup() -> (SignatureVerifier<MemoryRegistry>, DeviceKeypair, DeviceId) {
        let keypair = DeviceKeypair::from_seed(&[9u8; 32]).unwrap();
        let device = DeviceId::new("IOT-AB12CD34").unwrap();
        let registry = MemoryRegistry::new();
        registry.register(&device, &keypair.public_key()).await.unwrap();
        (SignatureVerifier::new(registry), keypair, device)
    }

    fn sign(keypair: &DeviceKeypair, data: &SensorData) -> String {
        keypair.sign_digest(&payload_digest(data)).unwrap().to_base64()
    }

    #[tokio::test]
    async fn test_valid_signature() {
        let (verifier, keypair, device) = setup().await;
        let sig = sign(&keypair, &payload());
        assert!(verifier.verify(&device, &payload(), &sig).await);
    }

    #[tokio::test]
    async fn test_key_order_irrelevant() {
        let (verifier, keypair, device) = setup().await;
        let sig = sign(&keypair, &payload());

        let mut reordered = SensorData::new();
        reordered.insert("timestamp".into(), json!(1716000000));
        reordered.insert("humidity".into(), json!(60));
        reordered.insert("temperature".into(), json!(22.5));
        assert!(verifier.verify(&device, &reordered, &sig).await);
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let (verifier, keypair, _) = setup().await;
        let sig = sign(&keypair, &payload());
        let stranger = DeviceId::new("IOT-00000000").unwrap();
        assert!(!verifier.verify(&stranger, &payload(), &sig).await);
    }

    #[tokio::test]
    async fn test_tampered_payload() {
        let (verifier, keypair, device) = setup().await;
        let sig = sign(&keypair, &payload());
        let mut tampered = payload();
        tampered.insert("humidity".into(), json!(61));
        assert!(!verifier.verify(&device, &tampered, &sig).await);
    }

    #[tokio::test]
    async fn test_malformed_signatures() {
        let (verifier, keypair, device) = setup().await;
        let sig = sign(&keypair, &payload());

        for bad in [&sig[..sig.len() - 4], "", "!!!not base64!!!", "AAAA"] {
            assert!(!verifier.verify(&device, &payload(), bad).await, "{bad:?}");
        }
    }

    #[tokio::test]
    async fn test_structurally_invalid_key() {
        let registry = MemoryRegistry::new();
        let device = DeviceId::new("IOT-BADKEY00").unwrap();
        registry
            .register(&device, &DevicePublicKey::from_bytes(vec![0x04; 10]))
            .await
            .unwrap();
        let verifier = SignatureVerifier::new(registry);

        let sig = sign(&DeviceKeypair::generate(), &payload());
        assert!(!verifier.verify(&device, &payload(), &sig).await);
    }

    #[tokio::test]
    async fn test_other_devices_key() {
        let (verifier, _, device) = setup().await;
        let sig = sign(&DeviceKeypair::generate(), &payload());
        assert!(!verifier.verify(&device, &payload(), &sig).await);
    }
}
