//! Error types for Anchorage Core.

use thiserror::Error;

/// Core errors that can occur while handling keys, signatures and identifiers.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid private key")]
    InvalidPrivateKey,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
