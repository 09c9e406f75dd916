//! Cryptographic primitives: ECDSA over secp256k1, SHA-256 and Keccak-256.
//!
//! Devices sign the SHA-256 digest of a payload's canonical bytes. The same
//! digest is what gets anchored on the ledger.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use std::fmt;

use crate::error::{CoreError, Result};
use crate::types::{decode_prefixed_hex, Address};

/// A 32-byte SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256Digest(pub [u8; 32]);

impl Sha256Digest {
    /// Compute the SHA-256 digest of data.
    pub fn hash(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Convert to CIDv1 (raw codec, base32).
    ///
    /// Format: `b` + base32lower(0x01 || 0x55 || 0x12 || 0x20 || digest)
    pub fn to_cid(&self) -> String {
        let mut cid_bytes = Vec::with_capacity(36);
        cid_bytes.push(0x01); // CIDv1
        cid_bytes.push(0x55); // raw codec
        cid_bytes.push(0x12); // sha2-256 multihash
        cid_bytes.push(0x20); // 32 bytes
        cid_bytes.extend_from_slice(&self.0);

        format!("b{}", base32_encode(&cid_bytes))
    }
}

impl fmt::Debug for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SHA256({}...)", &self.to_hex()[..8])
    }
}

impl AsRef<[u8]> for Sha256Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Sha256Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Keccak-256, as used for ledger addresses, selectors and transaction hashes.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Derive the 20-byte ledger address of a secp256k1 public key.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 SEC1 tag.
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..]);
    Address(addr)
}

/// A device's enrolled public key, exactly as supplied at registration.
///
/// The bytes are not validated on construction: the registry stores what it is
/// given and structural checks happen at verification time.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DevicePublicKey(Vec<u8>);

impl DevicePublicKey {
    /// Compressed SEC1 length.
    pub const COMPRESSED_LEN: usize = 33;
    /// Raw `x || y` coordinates, no SEC1 tag.
    pub const RAW_LEN: usize = 64;
    /// Uncompressed SEC1 length.
    pub const UNCOMPRESSED_LEN: usize = 65;

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse from hex, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self(decode_prefixed_hex(s)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Interpret the key material as a secp256k1 point.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        match self.0.len() {
            Self::COMPRESSED_LEN | Self::UNCOMPRESSED_LEN => {
                VerifyingKey::from_sec1_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)
            }
            Self::RAW_LEN => {
                let mut sec1 = Vec::with_capacity(Self::UNCOMPRESSED_LEN);
                sec1.push(0x04);
                sec1.extend_from_slice(&self.0);
                VerifyingKey::from_sec1_bytes(&sec1).map_err(|_| CoreError::InvalidPublicKey)
            }
            _ => Err(CoreError::InvalidPublicKey),
        }
    }

    /// The ledger address controlled by this key.
    pub fn address(&self) -> Result<Address> {
        Ok(address_of(&self.verifying_key()?))
    }

    /// Verify a signature over a prehashed digest.
    pub fn verify_digest(&self, digest: &Sha256Digest, signature: &DeviceSignature) -> Result<()> {
        let key = self.verifying_key()?;
        let sig = Signature::from_slice(&signature.0).map_err(|_| CoreError::InvalidSignature)?;
        // Devices are not required to emit low-S signatures.
        let sig = sig.normalize_s().unwrap_or(sig);
        key.verify_prehash(digest.as_bytes(), &sig)
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl fmt::Debug for DevicePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "DevicePub({}...)", &hex[..hex.len().min(16)])
    }
}

impl AsRef<[u8]> for DevicePublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 64-byte ECDSA signature in fixed `r || s` form.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DeviceSignature(pub [u8; 64]);

impl DeviceSignature {
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Decode from the standard base64 transport encoding.
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(s.trim())
            .map_err(|e| CoreError::DecodingError(e.to_string()))?;
        let arr: [u8; 64] = bytes.try_into().map_err(|_| CoreError::InvalidSignature)?;
        Ok(Self(arr))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl fmt::Debug for DeviceSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceSig({}...)", &hex::encode(&self.0[..4]))
    }
}

/// A secp256k1 signing key held by a device (or by tests standing in for one).
#[derive(Clone)]
pub struct DeviceKeypair {
    signing_key: SigningKey,
}

impl DeviceKeypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::random(&mut rng),
        }
    }

    /// Create from a 32-byte secret scalar.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self> {
        let signing_key = SigningKey::from_slice(seed).map_err(|_| CoreError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Public key in uncompressed SEC1 form.
    pub fn public_key(&self) -> DevicePublicKey {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        DevicePublicKey(point.as_bytes().to_vec())
    }

    /// Sign a prehashed digest.
    pub fn sign_digest(&self, digest: &Sha256Digest) -> Result<DeviceSignature> {
        let sig: Signature = self
            .signing_key
            .sign_prehash(digest.as_bytes())
            .map_err(|_| CoreError::InvalidSignature)?;
        let mut out = [0u8; 64];
        out.copy_from_slice(&sig.to_bytes());
        Ok(DeviceSignature(out))
    }
}

impl fmt::Debug for DeviceKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceKeypair({:?})", self.public_key())
    }
}

// RFC 4648 Base32 encoding (lowercase, no padding)
fn base32_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz234567";
    let mut result = String::new();
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for &byte in data {
        buffer = (buffer << 8) | (byte as u64);
        bits_in_buffer += 8;

        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let index = ((buffer >> bits_in_buffer) & 0x1f) as usize;
            result.push(ALPHABET[index] as char);
        }
    }

    if bits_in_buffer > 0 {
        let index = ((buffer << (5 - bits_in_buffer)) & 0x1f) as usize;
        result.push(ALPHABET[index] as char);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_digest() {
        let keypair = DeviceKeypair::generate();
        let digest = Sha256Digest::hash(b"hello world");
        let signature = keypair.sign_digest(&digest).unwrap();

        keypair.public_key().verify_digest(&digest, &signature).unwrap();

        let tampered = Sha256Digest::hash(b"hello worlD");
        assert!(keypair.public_key().verify_digest(&tampered, &signature).is_err());
    }

    #[test]
    fn test_deterministic_from_seed() {
        let kp1 = DeviceKeypair::from_seed(&[0x42; 32]).unwrap();
        let kp2 = DeviceKeypair::from_seed(&[0x42; 32]).unwrap();
        assert_eq!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn test_zero_seed_rejected() {
        assert!(DeviceKeypair::from_seed(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_public_key_encodings_agree() {
        let keypair = DeviceKeypair::from_seed(&[0x07; 32]).unwrap();
        let uncompressed = keypair.public_key();
        assert_eq!(uncompressed.as_bytes().len(), DevicePublicKey::UNCOMPRESSED_LEN);

        let raw = DevicePublicKey::from_bytes(uncompressed.as_bytes()[1..].to_vec());
        let compressed = DevicePublicKey::from_bytes(
            uncompressed
                .verifying_key()
                .unwrap()
                .to_encoded_point(true)
                .as_bytes()
                .to_vec(),
        );

        let addr = uncompressed.address().unwrap();
        assert_eq!(raw.address().unwrap(), addr);
        assert_eq!(compressed.address().unwrap(), addr);
    }

    #[test]
    fn test_wrong_length_key_is_invalid() {
        let short = DevicePublicKey::from_bytes(vec![0x04; 32]);
        assert!(matches!(short.verifying_key(), Err(CoreError::InvalidPublicKey)));
    }

    #[test]
    fn test_high_s_signature_accepted() {
        let keypair = DeviceKeypair::from_seed(&[0x11; 32]).unwrap();
        let digest = Sha256Digest::hash(b"payload");
        let sig = keypair.sign_digest(&digest).unwrap();

        // Flip s to n - s, the other valid encoding of the same signature.
        let parsed = Signature::from_slice(&sig.0).unwrap();
        let (r, s) = parsed.split_scalars();
        let neg_s: k256::Scalar = -(*s);
        let high = Signature::from_scalars((*r).to_bytes(), neg_s.to_bytes()).unwrap();
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(&high.to_bytes());

        keypair
            .public_key()
            .verify_digest(&digest, &DeviceSignature(bytes))
            .unwrap();
    }

    #[test]
    fn test_signature_base64() {
        let sig = DeviceSignature::from_bytes([0x5a; 64]);
        let encoded = sig.to_base64();
        assert_eq!(DeviceSignature::from_base64(&encoded).unwrap(), sig);

        // Truncated transport encoding never decodes to a signature.
        assert!(DeviceSignature::from_base64(&encoded[..encoded.len() - 8]).is_err());
    }

    #[test]
    fn test_address_known_vector() {
        // Secret key 1 maps to the generator point.
        let mut seed = [0u8; 32];
        seed[31] = 1;
        let keypair = DeviceKeypair::from_seed(&seed).unwrap();
        assert_eq!(
            keypair.public_key().address().unwrap().to_hex(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_base32_encode() {
        assert_eq!(base32_encode(b""), "");
        assert_eq!(base32_encode(b"f"), "my");
        assert_eq!(base32_encode(b"foobar"), "mzxw6ytboi");
    }

    #[test]
    fn test_cid_format() {
        let cid = Sha256Digest::hash(b"hello").to_cid();
        assert!(cid.starts_with("bafkrei"));
        assert_eq!(cid, cid.to_lowercase());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn keypair() -> impl Strategy<Value = DeviceKeypair> {
            any::<[u8; 32]>().prop_filter_map("scalar", |seed| DeviceKeypair::from_seed(&seed).ok())
        }

        proptest! {
            #[test]
            fn every_key_encoding_verifies(keypair in keypair(), message in any::<Vec<u8>>()) {
                let digest = Sha256Digest::hash(&message);
                let signature = keypair.sign_digest(&digest).unwrap();

                let uncompressed = keypair.public_key();
                let point = uncompressed.verifying_key().unwrap();
                let compressed = DevicePublicKey::from_bytes(point.to_encoded_point(true).as_bytes());
                let raw = DevicePublicKey::from_bytes(&uncompressed.as_bytes()[1..]);

                for key in [&uncompressed, &compressed, &raw] {
                    prop_assert!(key.verify_digest(&digest, &signature).is_ok());
                    prop_assert_eq!(key.address().unwrap(), uncompressed.address().unwrap());
                }
            }
        }
    }
}
