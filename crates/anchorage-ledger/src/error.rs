//! Error types for the ledger module.

use std::time::Duration;

use anchorage_core::{CoreError, TxHash};
use thiserror::Error;

/// Errors from ledger access and anchoring.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The transaction was mined but execution failed.
    #[error("transaction {tx_hash} reverted in block {block_number}")]
    Reverted { tx_hash: TxHash, block_number: u64 },

    /// No receipt was observed before the deadline. The transaction may still
    /// be mined later.
    #[error("no receipt for {tx_hash} after {waited:?}")]
    Timeout { tx_hash: TxHash, waited: Duration },

    /// The node could not be reached.
    #[error("ledger connection failed: {0}")]
    Connection(String),

    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node answered with something we could not interpret.
    #[error("malformed ledger response: {0}")]
    MalformedResponse(String),

    /// The transaction could not be signed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The node refused the signed transaction.
    #[error("submission rejected: {0}")]
    Submission(String),

    /// A read-only contract call failed.
    #[error("contract call failed: {0}")]
    CallFailed(String),

    /// Contract interface mismatch or undecodable call data.
    #[error("abi error: {0}")]
    Abi(String),

    /// No commitment stored at this index.
    #[error("no commitment at index {0}")]
    CommitmentNotFound(u64),
}

impl LedgerError {
    /// Short, stable classification for logs and API responses.
    pub fn reason(&self) -> &'static str {
        match self {
            LedgerError::Reverted { .. } => "reverted",
            LedgerError::Timeout { .. } => "timeout",
            LedgerError::Connection(_) => "connection",
            LedgerError::Rpc { .. } => "rpc",
            LedgerError::MalformedResponse(_) => "malformed_response",
            LedgerError::Signing(_) => "signing",
            LedgerError::Submission(_) => "submission",
            LedgerError::CallFailed(_) => "call_failed",
            LedgerError::Abi(_) => "abi",
            LedgerError::CommitmentNotFound(_) => "not_found",
        }
    }

    /// The transaction this error refers to, when one was submitted.
    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            LedgerError::Reverted { tx_hash, .. } | LedgerError::Timeout { tx_hash, .. } => {
                Some(*tx_hash)
            }
            _ => None,
        }
    }
}

impl From<ethers::abi::Error> for LedgerError {
    fn from(e: ethers::abi::Error) -> Self {
        LedgerError::Abi(e.to_string())
    }
}

impl From<CoreError> for LedgerError {
    fn from(e: CoreError) -> Self {
        LedgerError::MalformedResponse(e.to_string())
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
