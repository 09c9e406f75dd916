//! Error types for the store module.

use std::time::Duration;

use anchorage_core::{Cid, DeviceId};
use thiserror::Error;

/// Errors from the content-addressed store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached (connection or transport failure).
    #[error("content store unavailable: {0}")]
    Unavailable(String),

    /// The operation did not complete within its deadline.
    #[error("content store timed out after {0:?}")]
    Timeout(Duration),

    /// The store answered but refused the request.
    #[error("content store rejected request: {0}")]
    Rejected(String),

    /// No content under this identifier.
    #[error("content not found: {0}")]
    NotFound(Cid),

    /// Payload envelope serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether the failure came from the transport rather than from the content.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Errors from the device registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Registration input was empty or malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No key enrolled for this device.
    #[error("device not registered: {0}")]
    NotFound(DeviceId),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A blocking task or lock failed.
    #[error("registry task failed: {0}")]
    Task(String),
}

/// Result type for content store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Result type for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
