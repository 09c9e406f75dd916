//! # Anchorage Ledger
//!
//! Everything between a payload hash and its on-chain commitment: the node
//! RPC surface, the static contract table, legacy transaction signing, and
//! the [`AnchorService`] that ties them together. Encoding and transport
//! come from `ethers`; this crate owns nonce discipline and classification.
//!
//! ## Key Types
//!
//! - [`LedgerRpc`] - async trait over the node's JSON-RPC methods
//! - [`HttpLedger`] - an `ethers` `Provider<Http>` behind the [`LedgerRpc`] seam
//! - [`MemoryLedger`] - in-process node for tests
//! - [`ContractFunction`] / [`ContractInterface`] - entry point table and ABI validation
//! - [`AnchorService`] - nonce, fee, sign, submit, confirm, classify
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use anchorage_core::{Address, Cid, Sha256Digest};
//! use anchorage_ledger::{AccountKey, AnchorService, AnchorSettings, MemoryLedger};
//!
//! async fn example() {
//!     let contract = Address::from_bytes([0xcc; 20]);
//!     let ledger = Arc::new(MemoryLedger::new(1337, contract));
//!     let key = AccountKey::from_slice(&[0x22; 32]).unwrap();
//!     let service = AnchorService::new(ledger, key, contract, 1337, AnchorSettings::default());
//!
//!     let record = service
//!         .anchor(&Cid::new("bafkrei..."), "sensor", Address::ZERO, &Sha256Digest::hash(b"{}"))
//!         .await
//!         .unwrap();
//!     println!("anchored in {}", record.tx_hash);
//! }
//! ```

pub mod abi;
pub mod anchor;
pub mod error;
pub mod http;
pub mod memory;
pub mod rpc;
pub mod transaction;

pub use abi::{ContractFunction, ContractInterface, GetDataHash, StoreDataHash};
pub use anchor::{
    AnchorRecord, AnchorService, AnchorSettings, DEFAULT_GAS_LIMIT, DEFAULT_POLL_INTERVAL,
    DEFAULT_RECEIPT_TIMEOUT,
};
pub use error::{LedgerError, Result};
pub use http::HttpLedger;
pub use memory::{AcceptedTransaction, Commitment, MemoryLedger};
pub use rpc::{BlockTag, LedgerRpc, TxReceipt, TxStatus, EXECUTION_REVERTED};
pub use transaction::{AccountKey, LegacyTransaction, SignedTransaction};
