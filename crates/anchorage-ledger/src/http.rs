//! Ledger node reached over HTTP(S) through an `ethers` provider.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{BlockNumber, Bytes, TransactionReceipt, TransactionRequest};
use url::Url;

use anchorage_core::{Address, TxHash};

use crate::error::{LedgerError, Result};
use crate::rpc::{
    from_h256, to_h160, to_h256, u256_to_u128, u256_to_u64, BlockTag, LedgerRpc, TxReceipt,
    TxStatus,
};

/// A ledger node reached over HTTP(S).
pub struct HttpLedger {
    provider: Provider<Http>,
    url: Url,
    timeout: Duration,
}

/// Parse a provider endpoint. Only `http` and `https` URLs with a host are
/// accepted.
fn provider_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| LedgerError::Connection(format!("invalid provider url {}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some_and(|host| !host.is_empty()) => Ok(url),
        _ => Err(LedgerError::Connection(format!(
            "unsupported provider url (expected http or https with a host): {}",
            raw
        ))),
    }
}

impl HttpLedger {
    /// Build a client; every request is bounded by `timeout`.
    pub fn new(url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let url = provider_url(url.as_ref())?;
        let provider = Provider::new(Http::new(url.clone()));
        Ok(Self {
            provider,
            url,
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn bounded<T, F>(&self, method: &str, request: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, ProviderError>>,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result.map_err(classify),
            Err(_) => Err(LedgerError::Connection(format!(
                "{} timed out after {:?}",
                method, self.timeout
            ))),
        }
    }
}

/// Node-side error objects become `Rpc`, undecodable replies
/// `MalformedResponse`, and everything else a transport failure.
fn classify(err: ProviderError) -> LedgerError {
    if let Some(response) = err.as_error_response() {
        return LedgerError::Rpc {
            code: response.code,
            message: response.message.clone(),
        };
    }
    if err.is_serde_error() {
        return LedgerError::MalformedResponse(err.to_string());
    }
    LedgerError::Connection(err.to_string())
}

fn receipt_from(raw: TransactionReceipt) -> Result<Option<TxReceipt>> {
    // Some nodes return a receipt skeleton before the block is sealed.
    let Some(block) = raw.block_number else {
        return Ok(None);
    };
    let status = match raw.status.map(|s| s.as_u64()) {
        Some(1) => TxStatus::Success,
        Some(0) => TxStatus::Reverted,
        other => {
            return Err(LedgerError::MalformedResponse(format!(
                "receipt status {:?}",
                other
            )))
        }
    };
    Ok(Some(TxReceipt {
        tx_hash: from_h256(raw.transaction_hash),
        status,
        block_number: block.as_u64(),
    }))
}

#[async_trait]
impl LedgerRpc for HttpLedger {
    async fn chain_id(&self) -> Result<u64> {
        u256_to_u64(self.bounded("eth_chainId", self.provider.get_chainid()).await?)
    }

    async fn transaction_count(&self, address: &Address, tag: BlockTag) -> Result<u64> {
        let block = BlockNumber::from(tag).into();
        let count = self
            .bounded(
                "eth_getTransactionCount",
                self.provider.get_transaction_count(to_h160(address), Some(block)),
            )
            .await?;
        u256_to_u64(count)
    }

    async fn gas_price(&self) -> Result<u128> {
        u256_to_u128(self.bounded("eth_gasPrice", self.provider.get_gas_price()).await?)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash> {
        let hash = self
            .bounded("eth_sendRawTransaction", async {
                let pending = self
                    .provider
                    .send_raw_transaction(Bytes::from(raw.to_vec()))
                    .await?;
                Ok::<_, ProviderError>(pending.tx_hash())
            })
            .await?;
        Ok(from_h256(hash))
    }

    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>> {
        let receipt = self
            .bounded(
                "eth_getTransactionReceipt",
                self.provider.get_transaction_receipt(to_h256(tx_hash)),
            )
            .await?;
        match receipt {
            Some(raw) => receipt_from(raw),
            None => Ok(None),
        }
    }

    async fn call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>> {
        let request: TypedTransaction = TransactionRequest::new()
            .to(to_h160(to))
            .data(data.to_vec())
            .into();
        let out = self
            .bounded(
                "eth_call",
                self.provider.call(&request, Some(BlockNumber::Latest.into())),
            )
            .await?;
        Ok(out.to_vec())
    }

    async fn balance(&self, address: &Address) -> Result<u128> {
        let balance = self
            .bounded("eth_getBalance", self.provider.get_balance(to_h160(address), None))
            .await?;
        u256_to_u128(balance)
    }
}
