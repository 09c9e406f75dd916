//! # Anchorage Store
//!
//! Persistence for the integrity pipeline: the device registry that maps
//! device identifiers to enrolled public keys, and the content-addressed
//! store that holds submitted payloads off-ledger.
//!
//! ## Key Types
//!
//! - [`DeviceRegistry`] - async trait for key enrollment and lookup
//! - [`SqliteRegistry`] / [`MemoryRegistry`] - registry backends
//! - [`ContentStore`] - async trait for content-addressed blobs
//! - [`IpfsContentStore`] / [`MemoryContentStore`] - content backends
//! - [`ContentClient`] - envelope, deadline and decoding on top of a store
//!
//! ## Usage
//!
//! ```rust,no_run
//! use anchorage_core::{DeviceId, DeviceKeypair};
//! use anchorage_store::{DeviceRegistry, SqliteRegistry};
//!
//! async fn example() {
//!     let registry = SqliteRegistry::open("registry.db").unwrap();
//!     let device = DeviceId::new("IOT-AB12CD34").unwrap();
//!     let key = DeviceKeypair::generate().public_key();
//!
//!     registry.register(&device, &key).await.unwrap();
//!     assert_eq!(registry.lookup(&device).await.unwrap(), key);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Last write wins**: re-registration replaces the key and logs a warning
//! - **No deduplication**: every upload is a distinct record
//! - **No retries**: store failures are reported once, to the caller

pub mod client;
pub mod error;
pub mod ipfs;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use client::{ContentClient, ContentRecord, StoredPayload, DEFAULT_CONTENT_TIMEOUT};
pub use error::{RegistryError, RegistryResult, Result, StoreError};
pub use ipfs::IpfsContentStore;
pub use memory::{MemoryContentStore, MemoryRegistry};
pub use sqlite::SqliteRegistry;
pub use traits::{ContentStore, DeviceRegistry};
