//! In-process ledger node.
//!
//! Decodes raw signed transactions with the `ethers` RLP decoder, recovers
//! the sender the way a real node would, enforces per-account nonces, and
//! executes the two contract entry points against an in-memory commitment
//! list. Blocks are mined instantly, one transaction per block, unless
//! receipts are being withheld.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use anchorage_core::{Address, TxHash};

use crate::abi::{ContractFunction, GetDataHash, StoreDataHash};
use crate::error::{LedgerError, Result};
use crate::rpc::{BlockTag, LedgerRpc, TxReceipt, TxStatus, EXECUTION_REVERTED};
use crate::transaction::SignedTransaction;

/// A commitment recorded by `storeDataHash`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commitment {
    pub cid: String,
    pub data_type: String,
    pub device_address: Address,
    pub data_hash: [u8; 32],
    pub sender: Address,
    pub tx_hash: TxHash,
}

/// A transaction the node accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptedTransaction {
    pub from: Address,
    pub nonce: u64,
    pub tx_hash: TxHash,
}

#[derive(Default)]
struct State {
    nonces: HashMap<Address, u64>,
    balances: HashMap<Address, u128>,
    commitments: Vec<Commitment>,
    accepted: Vec<AcceptedTransaction>,
    receipts: HashMap<TxHash, TxReceipt>,
    withheld: Vec<TxReceipt>,
    block_number: u64,
}

/// In-memory ledger node for tests and local runs.
pub struct MemoryLedger {
    chain_id: u64,
    contract: Address,
    gas_price: u128,
    state: Mutex<State>,
    offline: AtomicBool,
    revert: AtomicBool,
    withhold_receipts: AtomicBool,
}

impl MemoryLedger {
    /// A node on `chain_id` with the anchoring contract deployed at `contract`.
    pub fn new(chain_id: u64, contract: Address) -> Self {
        Self {
            chain_id,
            contract,
            gas_price: 1_000_000_000,
            state: Mutex::new(State::default()),
            offline: AtomicBool::new(false),
            revert: AtomicBool::new(false),
            withhold_receipts: AtomicBool::new(false),
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Make every RPC fail with a connection error (or recover).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make subsequent contract executions revert.
    pub fn set_revert(&self, revert: bool) {
        self.revert.store(revert, Ordering::SeqCst);
    }

    /// Accept transactions but keep their receipts unpublished until
    /// [`release_receipts`](Self::release_receipts).
    pub fn set_withhold_receipts(&self, withhold: bool) {
        self.withhold_receipts.store(withhold, Ordering::SeqCst);
    }

    /// Publish every withheld receipt.
    pub async fn release_receipts(&self) {
        let mut state = self.state.lock().await;
        let withheld = std::mem::take(&mut state.withheld);
        for receipt in withheld {
            state.receipts.insert(receipt.tx_hash, receipt);
        }
    }

    pub async fn fund(&self, address: Address, amount: u128) {
        *self.state.lock().await.balances.entry(address).or_default() += amount;
    }

    pub async fn commitments(&self) -> Vec<Commitment> {
        self.state.lock().await.commitments.clone()
    }

    /// Every transaction accepted so far, in submission order.
    pub async fn accepted(&self) -> Vec<AcceptedTransaction> {
        self.state.lock().await.accepted.clone()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Connection("connection refused".into()));
        }
        Ok(())
    }

    /// Execute a transaction's call data; `true` on success.
    fn execute(&self, state: &mut State, signed: &SignedTransaction) -> bool {
        if self.revert.load(Ordering::SeqCst) || signed.tx.to != self.contract {
            return false;
        }
        if ContractFunction::from_call_data(&signed.tx.data) != Some(ContractFunction::StoreDataHash) {
            return false;
        }
        match StoreDataHash::decode_call(&signed.tx.data) {
            Ok(args) => {
                state.commitments.push(Commitment {
                    cid: args.cid,
                    data_type: args.data_type,
                    device_address: args.device_address,
                    data_hash: args.data_hash,
                    sender: signed.from,
                    tx_hash: signed.hash(),
                });
                true
            }
            Err(_) => false,
        }
    }
}

#[async_trait]
impl LedgerRpc for MemoryLedger {
    async fn chain_id(&self) -> Result<u64> {
        self.check_online()?;
        Ok(self.chain_id)
    }

    async fn transaction_count(&self, address: &Address, _tag: BlockTag) -> Result<u64> {
        self.check_online()?;
        Ok(self
            .state
            .lock()
            .await
            .nonces
            .get(address)
            .copied()
            .unwrap_or(0))
    }

    async fn gas_price(&self) -> Result<u128> {
        self.check_online()?;
        Ok(self.gas_price)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash> {
        self.check_online()?;
        let signed = SignedTransaction::decode(raw).map_err(|e| LedgerError::Rpc {
            code: -32602,
            message: format!("invalid transaction: {}", e),
        })?;

        if signed.tx.chain_id != self.chain_id {
            return Err(LedgerError::Rpc {
                code: -32000,
                message: format!("invalid chain id {}", signed.tx.chain_id),
            });
        }

        let mut state = self.state.lock().await;
        let expected = state.nonces.get(&signed.from).copied().unwrap_or(0);
        if signed.tx.nonce != expected {
            let message = if signed.tx.nonce < expected {
                "nonce too low"
            } else {
                "nonce too high"
            };
            return Err(LedgerError::Rpc {
                code: -32000,
                message: format!("{}: next nonce {}, tx nonce {}", message, expected, signed.tx.nonce),
            });
        }
        state.nonces.insert(signed.from, expected + 1);
        state.accepted.push(AcceptedTransaction {
            from: signed.from,
            nonce: signed.tx.nonce,
            tx_hash: signed.hash(),
        });

        let success = self.execute(&mut state, &signed);
        state.block_number += 1;
        let receipt = TxReceipt {
            tx_hash: signed.hash(),
            status: if success { TxStatus::Success } else { TxStatus::Reverted },
            block_number: state.block_number,
        };

        if self.withhold_receipts.load(Ordering::SeqCst) {
            state.withheld.push(receipt);
        } else {
            state.receipts.insert(signed.hash(), receipt);
        }
        Ok(signed.hash())
    }

    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>> {
        self.check_online()?;
        Ok(self.state.lock().await.receipts.get(tx_hash).cloned())
    }

    async fn call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>> {
        self.check_online()?;
        let reverted = || LedgerError::Rpc {
            code: EXECUTION_REVERTED,
            message: "execution reverted".into(),
        };
        if *to != self.contract {
            return Ok(Vec::new());
        }

        let args = GetDataHash::decode_call(data).map_err(|_| reverted())?;
        let state = self.state.lock().await;
        let index = usize::try_from(args.index).map_err(|_| reverted())?;
        state
            .commitments
            .get(index)
            .map(|c| GetDataHash::encode_output(&c.cid))
            .ok_or_else(reverted)
    }

    async fn balance(&self, address: &Address) -> Result<u128> {
        self.check_online()?;
        Ok(self
            .state
            .lock()
            .await
            .balances
            .get(address)
            .copied()
            .unwrap_or(0))
    }
}
