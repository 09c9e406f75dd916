//! # Anchorage
//!
//! Tamper-evident ingestion of IoT sensor payloads.
//!
//! A payload submitted by a registered device is authenticated against the
//! device registry, its signature is checked over the canonical encoding,
//! the payload is written to content-addressed storage, and a commitment
//! `(cid, data_type, device_address, sha256)` is anchored on the ledger. The
//! caller gets back the content identifier and the transaction hash.
//!
//! ## Key Types
//!
//! - [`Pipeline`] - the orchestrator, generic over registry, store and ledger
//! - [`SignatureVerifier`] - boolean signature check against the registry
//! - [`PipelineState`] - per-request state machine; [`Progress`] records one walk through it
//! - [`AnchorageConfig`] - startup configuration and validation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use anchorage::{AnchorageConfig, Pipeline};
//! use anchorage::core::{DeviceId, SensorData};
//!
//! async fn example(data: SensorData, signature: &str) {
//!     let config = AnchorageConfig::from_env().unwrap();
//!     let pipeline = Pipeline::connect(config).await.unwrap();
//!
//!     let device = DeviceId::new("IOT-AB12CD34").unwrap();
//!     match pipeline.submit(&device, &data, signature).await {
//!         Ok(result) => println!("{} anchored in {}", result.cid, result.tx_hash),
//!         Err(e) => eprintln!("{:?}: {}", e.outcome(), e),
//!     }
//! }
//! ```
//!
//! ## Design Notes
//!
//! - All anchoring from one service account is serialized inside the
//!   [`AnchorService`]; concurrent `submit` calls are safe.
//! - Nothing is retried. A resubmitted payload gets a new cid and a new
//!   transaction.
//! - If anchoring fails after the payload was stored, the stored record is
//!   left in place and its cid is carried by the error.
//!
//! ## Re-exports
//!
//! - `anchorage::core` - canonical encoding, digests, device keys
//! - `anchorage::store` - device registry and content store backends
//! - `anchorage::ledger` - ledger RPC, contract table, anchor service

pub mod config;
pub mod error;
pub mod pipeline;
pub mod state;
pub mod verifier;

// Re-export component crates
pub use anchorage_core as core;
pub use anchorage_ledger as ledger;
pub use anchorage_store as store;

pub use config::{
    AnchorageConfig, ConfigError, ContentConfig, LedgerConfig, PipelineConfig, RegistryConfig,
    ResolvedLedger, Secret,
};
pub use error::{PipelineError, Result};
pub use pipeline::{CommitmentReport, Pipeline, PipelineResult};
pub use state::{FailureKind, PipelineState, Progress, RejectReason};
pub use verifier::{verify_with_key, SignatureVerifier};

pub use anchorage_core::{
    canonical_bytes, payload_digest, Cid, DeviceId, DeviceKeypair, DevicePublicKey,
    DeviceSignature, SensorData, Sha256Digest, TxHash,
};
pub use anchorage_ledger::{AnchorService, AnchorSettings, LedgerError};
pub use anchorage_store::{ContentClient, StoreError};
