//! # Anchorage Core
//!
//! Pure primitives for the Anchorage data-integrity pipeline: canonical
//! payload encoding, digests, and secp256k1 device keys.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over sensor payloads and the keys that sign them.
//!
//! ## Key Types
//!
//! - [`SensorData`] - A device payload: string keys to JSON values
//! - [`Sha256Digest`] - The payload commitment (signed by devices, anchored on-chain)
//! - [`DevicePublicKey`] / [`DeviceSignature`] - Device trust anchor and proof
//! - [`DeviceId`], [`Cid`], [`TxHash`], [`Address`] - Strong identifiers
//!
//! ## Canonicalization
//!
//! Payloads are hashed and signed over their canonical encoding only. See the
//! [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod types;

pub use canonical::{canonical_bytes, canonical_string, payload_digest, SensorData};
pub use crypto::{keccak256, DeviceKeypair, DevicePublicKey, DeviceSignature, Sha256Digest};
pub use error::{CoreError, Result};
pub use types::{Address, Cid, DeviceId, TxHash};
