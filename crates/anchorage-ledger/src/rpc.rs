//! The ledger node interface consumed by the anchor service.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{BlockNumber, H160, H256, U256};
use serde::{Deserialize, Serialize};

use anchorage_core::{Address, TxHash};

use crate::error::{LedgerError, Result};

/// JSON-RPC error code nodes use for a reverted `eth_call`.
pub const EXECUTION_REVERTED: i64 = 3;

/// Which state to read an account's transaction count from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    /// Includes transactions still in the node's pool.
    Pending,
}

impl From<BlockTag> for BlockNumber {
    fn from(tag: BlockTag) -> Self {
        match tag {
            BlockTag::Latest => BlockNumber::Latest,
            BlockTag::Pending => BlockNumber::Pending,
        }
    }
}

/// Execution outcome recorded in a receipt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Success,
    Reverted,
}

pub(crate) fn to_h160(address: &Address) -> H160 {
    H160::from(*address.as_bytes())
}

pub(crate) fn from_h160(address: H160) -> Address {
    Address::from_bytes(address.0)
}

pub(crate) fn to_h256(hash: &TxHash) -> H256 {
    H256::from(*hash.as_bytes())
}

pub(crate) fn from_h256(hash: H256) -> TxHash {
    TxHash::from_bytes(hash.0)
}

pub(crate) fn u256_to_u64(value: U256) -> Result<u64> {
    if value.bits() > 64 {
        return Err(LedgerError::MalformedResponse(format!("{} exceeds u64", value)));
    }
    Ok(value.as_u64())
}

pub(crate) fn u256_to_u128(value: U256) -> Result<u128> {
    if value.bits() > 128 {
        return Err(LedgerError::MalformedResponse(format!("{} exceeds u128", value)));
    }
    Ok(value.as_u128())
}

/// Confirmation of a mined transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub status: TxStatus,
    pub block_number: u64,
}

/// Minimal JSON-RPC surface of a ledger node.
///
/// Implementations report transport failures as `LedgerError::Connection`
/// and node-side errors as `LedgerError::Rpc`.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// `eth_chainId`
    async fn chain_id(&self) -> Result<u64>;

    /// `eth_getTransactionCount`
    async fn transaction_count(&self, address: &Address, tag: BlockTag) -> Result<u64>;

    /// `eth_gasPrice`
    async fn gas_price(&self) -> Result<u128>;

    /// `eth_sendRawTransaction`
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash>;

    /// `eth_getTransactionReceipt`; `None` while the transaction is unmined.
    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>>;

    /// `eth_call` against the latest block.
    async fn call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>>;

    /// `eth_getBalance`
    async fn balance(&self, address: &Address) -> Result<u128>;
}

#[async_trait]
impl<T: LedgerRpc + ?Sized> LedgerRpc for Arc<T> {
    async fn chain_id(&self) -> Result<u64> {
        (**self).chain_id().await
    }

    async fn transaction_count(&self, address: &Address, tag: BlockTag) -> Result<u64> {
        (**self).transaction_count(address, tag).await
    }

    async fn gas_price(&self) -> Result<u128> {
        (**self).gas_price().await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash> {
        (**self).send_raw_transaction(raw).await
    }

    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>> {
        (**self).transaction_receipt(tx_hash).await
    }

    async fn call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>> {
        (**self).call(to, data).await
    }

    async fn balance(&self, address: &Address) -> Result<u128> {
        (**self).balance(address).await
    }
}
