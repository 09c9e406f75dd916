//! Legacy (type 0) ledger transactions with EIP-155 replay protection.
//!
//! Signing and RLP serialization go through `ethers`: the unsigned form is a
//! `TransactionRequest`, signed by the service account's `LocalWallet`.

use std::fmt;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Signature, Transaction, TransactionRequest};
use ethers::utils::rlp;

use anchorage_core::{keccak256, Address, CoreError, TxHash};

use crate::error::{LedgerError, Result};
use crate::rpc::{from_h160, to_h160, u256_to_u128, u256_to_u64};

/// The service account's signing key.
///
/// Held only in memory. `Debug` shows the address, never the key.
pub struct AccountKey {
    wallet: LocalWallet,
    address: Address,
}

impl AccountKey {
    /// Parse a 32-byte secp256k1 scalar from hex (optional `0x`).
    pub fn from_hex(s: &str) -> std::result::Result<Self, CoreError> {
        let stripped = s.trim().trim_start_matches("0x");
        let bytes = hex::decode(stripped).map_err(|_| CoreError::InvalidPrivateKey)?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> std::result::Result<Self, CoreError> {
        if bytes.len() != 32 {
            return Err(CoreError::InvalidPrivateKey);
        }
        let wallet = LocalWallet::from_bytes(bytes).map_err(|_| CoreError::InvalidPrivateKey)?;
        let address = from_h160(wallet.address());
        Ok(Self { wallet, address })
    }

    /// The ledger address this key signs for.
    pub fn address(&self) -> Address {
        self.address
    }

    fn sign(&self, tx: &TypedTransaction) -> Result<Signature> {
        self.wallet
            .sign_transaction_sync(tx)
            .map_err(|e| LedgerError::Signing(e.to_string()))
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKey")
            .field("address", &self.address)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

/// An unsigned legacy transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTransaction {
    fn request(&self) -> TypedTransaction {
        TransactionRequest::new()
            .nonce(self.nonce)
            .gas_price(self.gas_price)
            .gas(self.gas_limit)
            .to(to_h160(&self.to))
            .value(self.value)
            .data(self.data.clone())
            .chain_id(self.chain_id)
            .into()
    }

    /// Keccak-256 of the EIP-155 signing payload.
    pub fn signing_hash(&self) -> [u8; 32] {
        self.request().sighash().0
    }

    pub fn sign(self, key: &AccountKey) -> Result<SignedTransaction> {
        let request = self.request();
        let signature = key.sign(&request)?;
        let raw = request.rlp_signed(&signature).to_vec();
        let hash = TxHash::from_bytes(keccak256(&raw));

        Ok(SignedTransaction {
            tx: self,
            from: key.address(),
            raw,
            hash,
        })
    }
}

/// A signed transaction, ready for `eth_sendRawTransaction`.
#[derive(Clone, Debug)]
pub struct SignedTransaction {
    pub tx: LegacyTransaction,
    pub from: Address,
    raw: Vec<u8>,
    hash: TxHash,
}

impl SignedTransaction {
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }

    /// Decode raw bytes and recover the sender.
    ///
    /// Only EIP-155 legacy transactions to an address are accepted.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let decoded: Transaction = rlp::decode(raw)
            .map_err(|e| LedgerError::MalformedResponse(format!("transaction rlp: {}", e)))?;

        if decoded.transaction_type.is_some_and(|t| !t.is_zero()) {
            return Err(LedgerError::MalformedResponse(
                "only legacy transactions are accepted".into(),
            ));
        }
        let chain_id = decoded.chain_id.ok_or_else(|| {
            LedgerError::MalformedResponse("transaction is not EIP-155 protected".into())
        })?;
        let to = decoded
            .to
            .ok_or_else(|| LedgerError::MalformedResponse("transaction has no recipient".into()))?;
        let from = decoded
            .recover_from()
            .map_err(|e| LedgerError::MalformedResponse(format!("unrecoverable sender: {}", e)))?;

        let tx = LegacyTransaction {
            nonce: u256_to_u64(decoded.nonce)?,
            gas_price: u256_to_u128(decoded.gas_price.unwrap_or_default())?,
            gas_limit: u256_to_u64(decoded.gas)?,
            to: from_h160(to),
            value: u256_to_u128(decoded.value)?,
            data: decoded.input.to_vec(),
            chain_id: u256_to_u64(chain_id)?,
        };

        Ok(Self {
            tx,
            from: from_h160(from),
            raw: raw.to_vec(),
            hash: TxHash::from_bytes(keccak256(raw)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> AccountKey {
        let mut seed = [0u8; 32];
        seed[31] = 1;
        AccountKey::from_slice(&seed).unwrap()
    }

    fn sample(nonce: u64) -> LegacyTransaction {
        LegacyTransaction {
            nonce,
            gas_price: 20_000_000_000,
            gas_limit: 2_000_000,
            to: Address::from_bytes([0x42; 20]),
            value: 0,
            data: vec![0xde, 0xad, 0xbe, 0xef],
            chain_id: 1337,
        }
    }

    #[test]
    fn test_account_address_from_known_key() {
        assert_eq!(
            key().address().to_hex(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_account_key_rejects_bad_input() {
        assert!(AccountKey::from_hex("0x1234").is_err());
        assert!(AccountKey::from_hex(&"00".repeat(32)).is_err());
        assert!(AccountKey::from_hex("not hex").is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", key());
        assert!(debug.contains("redacted"));
        assert!(!debug.contains(&"0".repeat(63)));
    }

    #[test]
    fn test_sign_then_decode_recovers_sender() {
        let key = key();
        let signed = sample(7).sign(&key).unwrap();
        let decoded = SignedTransaction::decode(signed.raw()).unwrap();

        assert_eq!(decoded.from, key.address());
        assert_eq!(decoded.tx, sample(7));
        assert_eq!(decoded.hash(), signed.hash());
    }

    #[test]
    fn test_chain_id_bound_into_signature() {
        let mut other_chain = sample(0);
        other_chain.chain_id = 1;
        assert_ne!(other_chain.signing_hash(), sample(0).signing_hash());

        let decoded = SignedTransaction::decode(other_chain.sign(&key()).unwrap().raw()).unwrap();
        assert_eq!(decoded.tx.chain_id, 1);
    }

    #[test]
    fn test_hash_is_keccak_of_raw() {
        let signed = sample(0).sign(&key()).unwrap();
        assert_eq!(signed.hash().as_bytes(), &keccak256(signed.raw()));
        assert_eq!(signed.hash().to_hex().len(), 66);
    }

    #[test]
    fn test_nonce_changes_hash() {
        let a = sample(1).sign(&key()).unwrap();
        let b = sample(2).sign(&key()).unwrap();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(SignedTransaction::decode(&[0xc0]).is_err());
        assert!(SignedTransaction::decode(b"not rlp at all").is_err());
    }
}
