//! The anchor service: commits `(cid, data_type, device_address, data_hash)`
//! on the ledger and reports the outcome.
//!
//! ## Nonce discipline
//!
//! Every anchor attempt from the service account takes `nonce_lock` before
//! reading the account nonce and holds it until the node has accepted (or
//! refused) the signed transaction. Two concurrent attempts can therefore
//! never sign with the same nonce. The lock is released before the receipt
//! wait so confirmations overlap.
//!
//! The nonce used is `max(pending count from node, last submitted + 1)`, which
//! covers nodes whose pending view lags behind their own pool. A refused
//! submission does not advance the local counter.

use std::time::Duration;

use tokio::sync::Mutex;

use anchorage_core::{Address, Cid, Sha256Digest, TxHash};

use crate::abi::{GetDataHash, StoreDataHash};
use crate::error::{LedgerError, Result};
use crate::rpc::{BlockTag, LedgerRpc, TxReceipt, TxStatus, EXECUTION_REVERTED};
use crate::transaction::{AccountKey, LegacyTransaction};

/// Default gas allowance per anchor transaction.
pub const DEFAULT_GAS_LIMIT: u64 = 2_000_000;

/// Default hard deadline for the receipt wait.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Tunables for anchoring.
#[derive(Clone, Debug)]
pub struct AnchorSettings {
    pub gas_limit: u64,
    pub receipt_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for AnchorSettings {
    fn default() -> Self {
        Self {
            gas_limit: DEFAULT_GAS_LIMIT,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// A confirmed, successful anchor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnchorRecord {
    pub tx_hash: TxHash,
    pub status: TxStatus,
    pub block_number: u64,
    pub nonce: u64,
}

/// Submits anchor transactions from a single service account.
pub struct AnchorService<L> {
    rpc: L,
    key: AccountKey,
    contract: Address,
    chain_id: u64,
    settings: AnchorSettings,
    /// Last nonce this service got accepted, if any.
    nonce_lock: Mutex<Option<u64>>,
}

impl<L: LedgerRpc> AnchorService<L> {
    pub fn new(
        rpc: L,
        key: AccountKey,
        contract: Address,
        chain_id: u64,
        settings: AnchorSettings,
    ) -> Self {
        Self {
            rpc,
            key,
            contract,
            chain_id,
            settings,
            nonce_lock: Mutex::new(None),
        }
    }

    pub fn rpc(&self) -> &L {
        &self.rpc
    }

    /// The service account address.
    pub fn account(&self) -> Address {
        self.key.address()
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn settings(&self) -> &AnchorSettings {
        &self.settings
    }

    /// Commit a payload hash on the ledger and wait for confirmation.
    ///
    /// No retries: a failed or timed-out attempt is returned to the caller,
    /// and a resubmission draws a fresh nonce.
    pub async fn anchor(
        &self,
        cid: &Cid,
        data_type: &str,
        device_address: Address,
        data_hash: &Sha256Digest,
    ) -> Result<AnchorRecord> {
        let data = StoreDataHash {
            cid: cid.as_str().to_string(),
            data_type: data_type.to_string(),
            device_address,
            data_hash: *data_hash.as_bytes(),
        }
        .encode_call()?;

        let (tx_hash, nonce) = self.submit(data).await?;
        tracing::info!(tx_hash = %tx_hash, nonce, cid = %cid, "anchor submitted");

        let receipt = self.wait_for_receipt(tx_hash).await?;
        match receipt.status {
            TxStatus::Success => {
                tracing::info!(
                    tx_hash = %tx_hash,
                    block_number = receipt.block_number,
                    "anchor confirmed"
                );
                Ok(AnchorRecord {
                    tx_hash,
                    status: receipt.status,
                    block_number: receipt.block_number,
                    nonce,
                })
            }
            TxStatus::Reverted => {
                tracing::warn!(
                    tx_hash = %tx_hash,
                    block_number = receipt.block_number,
                    "anchor reverted"
                );
                Err(LedgerError::Reverted {
                    tx_hash,
                    block_number: receipt.block_number,
                })
            }
        }
    }

    /// Read the content identifier stored at `index`.
    ///
    /// Read-only: no transaction, no nonce, no gas.
    pub async fn get_commitment(&self, index: u64) -> Result<Cid> {
        let data = GetDataHash { index }.encode_call()?;
        let out = match self.rpc.call(&self.contract, &data).await {
            Ok(out) => out,
            Err(LedgerError::Rpc { code, message })
                if code == EXECUTION_REVERTED || message.contains("revert") =>
            {
                return Err(LedgerError::CommitmentNotFound(index));
            }
            Err(LedgerError::Rpc { code, message }) => {
                return Err(LedgerError::CallFailed(format!("{}: {}", code, message)));
            }
            Err(e) => return Err(e),
        };

        if out.is_empty() {
            return Err(LedgerError::CommitmentNotFound(index));
        }
        let cid = GetDataHash::decode_output(&out)
            .map_err(|e| LedgerError::MalformedResponse(e.to_string()))?;
        if cid.is_empty() {
            return Err(LedgerError::CommitmentNotFound(index));
        }
        Ok(Cid::new(cid))
    }

    /// Nonce read, sign and submit under the account lock.
    async fn submit(&self, data: Vec<u8>) -> Result<(TxHash, u64)> {
        let mut last = self.nonce_lock.lock().await;

        let pending = self
            .rpc
            .transaction_count(&self.account(), BlockTag::Pending)
            .await?;
        let nonce = match *last {
            Some(prev) => pending.max(prev + 1),
            None => pending,
        };
        let gas_price = self.rpc.gas_price().await?;

        let signed = LegacyTransaction {
            nonce,
            gas_price,
            gas_limit: self.settings.gas_limit,
            to: self.contract,
            value: 0,
            data,
            chain_id: self.chain_id,
        }
        .sign(&self.key)?;

        let returned = self
            .rpc
            .send_raw_transaction(signed.raw())
            .await
            .map_err(|e| match e {
                LedgerError::Rpc { code, message } => {
                    LedgerError::Submission(format!("{} (code {})", message, code))
                }
                other => other,
            })?;

        if returned != signed.hash() {
            tracing::warn!(
                local = %signed.hash(),
                node = %returned,
                "node reported a different transaction hash"
            );
        }

        *last = Some(nonce);
        Ok((signed.hash(), nonce))
    }

    /// Poll for a receipt until one appears or the deadline passes.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt> {
        let waited = self.settings.receipt_timeout;
        let poll = async {
            loop {
                if let Some(receipt) = self.rpc.transaction_receipt(&tx_hash).await? {
                    return Ok::<_, LedgerError>(receipt);
                }
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        };

        match tokio::time::timeout(waited, poll).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(tx_hash = %tx_hash, ?waited, "receipt wait timed out");
                Err(LedgerError::Timeout { tx_hash, waited })
            }
        }
    }
}

impl<L> std::fmt::Debug for AnchorService<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorService")
            .field("account", &self.key.address())
            .field("contract", &self.contract)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedger;
    use std::sync::Arc;

    const CHAIN: u64 = 1337;

    fn service(ledger: Arc<MemoryLedger>, settings: AnchorSettings) -> AnchorService<Arc<MemoryLedger>> {
        let contract = ledger.contract();
        AnchorService::new(
            ledger,
            AccountKey::from_slice(&[0x22; 32]).unwrap(),
            contract,
            CHAIN,
            settings,
        )
    }

    fn fast() -> AnchorSettings {
        AnchorSettings {
            receipt_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
            ..AnchorSettings::default()
        }
    }

    fn ledger() -> Arc<MemoryLedger> {
        Arc::new(MemoryLedger::new(CHAIN, Address::from_bytes([0xcc; 20])))
    }

    fn digest() -> Sha256Digest {
        Sha256Digest::hash(b"payload")
    }

    #[tokio::test]
    async fn test_anchor_and_read_back() {
        let ledger = ledger();
        let service = service(ledger.clone(), fast());
        let cid = Cid::new("bafkreianchor");
        let device = Address::from_bytes([0xab; 20]);

        let record = service.anchor(&cid, "sensor", device, &digest()).await.unwrap();
        assert_eq!(record.status, TxStatus::Success);
        assert_eq!(record.nonce, 0);
        assert_eq!(record.tx_hash.to_hex().len(), 66);

        assert_eq!(service.get_commitment(0).await.unwrap(), cid);
        let stored = &ledger.commitments().await[0];
        assert_eq!(stored.device_address, device);
        assert_eq!(stored.data_type, "sensor");
        assert_eq!(&stored.data_hash, digest().as_bytes());
    }

    #[tokio::test]
    async fn test_sequential_anchors_use_increasing_nonces() {
        let service = service(ledger(), fast());
        for expected in 0..3 {
            let record = service
                .anchor(&Cid::new("c"), "sensor", Address::ZERO, &digest())
                .await
                .unwrap();
            assert_eq!(record.nonce, expected);
        }
    }

    #[tokio::test]
    async fn test_revert_classified() {
        let ledger = ledger();
        ledger.set_revert(true);
        let service = service(ledger, fast());

        let err = service
            .anchor(&Cid::new("c"), "sensor", Address::ZERO, &digest())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Reverted { block_number: 1, .. }));
    }

    #[tokio::test]
    async fn test_receipt_timeout_classified() {
        let ledger = ledger();
        ledger.set_withhold_receipts(true);
        let service = service(ledger, fast());

        let err = service
            .anchor(&Cid::new("c"), "sensor", Address::ZERO, &digest())
            .await
            .unwrap_err();
        match err {
            LedgerError::Timeout { waited, .. } => assert_eq!(waited, Duration::from_millis(200)),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_offline_node_is_connection_error() {
        let ledger = ledger();
        ledger.set_offline(true);
        let service = service(ledger, fast());

        let err = service
            .anchor(&Cid::new("c"), "sensor", Address::ZERO, &digest())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "connection");
    }

    #[tokio::test]
    async fn test_refused_submission_classified() {
        let ledger = ledger();
        let contract = ledger.contract();
        let service = AnchorService::new(
            ledger,
            AccountKey::from_slice(&[0x22; 32]).unwrap(),
            contract,
            1,
            fast(),
        );

        let err = service
            .anchor(&Cid::new("c"), "sensor", Address::ZERO, &digest())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "submission");
    }

    #[tokio::test]
    async fn test_missing_commitment() {
        let service = service(ledger(), fast());
        let err = service.get_commitment(42).await.unwrap_err();
        assert!(matches!(err, LedgerError::CommitmentNotFound(42)));
    }

    #[test]
    fn test_debug_hides_key() {
        let service = service(ledger(), fast());
        let debug = format!("{:?}", service);
        assert!(debug.contains("account"));
        assert!(!debug.contains("signing_key"));
    }
}
