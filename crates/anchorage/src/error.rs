//! Error types for the pipeline.

use anchorage_core::{Cid, DeviceId};
use anchorage_ledger::LedgerError;
use anchorage_store::{RegistryError, StoreError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::state::{FailureKind, PipelineState, RejectReason};

/// Errors that can occur during pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The device is not registered.
    #[error("device not registered: {0}")]
    Authentication(DeviceId),

    /// The signature did not verify against the registered key.
    #[error("signature verification failed for device {0}")]
    Signature(DeviceId),

    /// Caller input was malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The device registry backend failed; the device may or may not be
    /// registered.
    #[error("registry error: {0}")]
    Registry(#[source] RegistryError),

    /// The content store was unreachable or refused the write.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Anchoring or a ledger read failed.
    ///
    /// When the payload was already stored, `orphaned_cid` names the content
    /// record that now has no commitment on the ledger.
    #[error("ledger error ({}): {source}", .source.reason())]
    Ledger {
        orphaned_cid: Option<Cid>,
        #[source]
        source: LedgerError,
    },

    /// Startup configuration was invalid.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl PipelineError {
    /// The terminal state a request ends in when it fails with this error.
    ///
    /// A registry backend failure is `Failed(Registry)`, distinct from both
    /// an unregistered device and a content store failure. `None` for errors
    /// that are not per-request outcomes.
    pub fn outcome(&self) -> Option<PipelineState> {
        match self {
            PipelineError::Authentication(_) => {
                Some(PipelineState::Rejected(RejectReason::Unregistered))
            }
            PipelineError::Signature(_) => Some(PipelineState::Rejected(RejectReason::BadSignature)),
            PipelineError::Registry(_) => Some(PipelineState::Failed(FailureKind::Registry)),
            PipelineError::Storage(_) => Some(PipelineState::Failed(FailureKind::Storage)),
            PipelineError::Ledger { .. } => Some(PipelineState::Failed(FailureKind::Ledger)),
            PipelineError::InvalidInput(_) | PipelineError::Configuration(_) => None,
        }
    }

    /// Content stored by a request whose anchoring failed.
    pub fn orphaned_cid(&self) -> Option<&Cid> {
        match self {
            PipelineError::Ledger { orphaned_cid, .. } => orphaned_cid.as_ref(),
            _ => None,
        }
    }
}

impl From<LedgerError> for PipelineError {
    fn from(source: LedgerError) -> Self {
        PipelineError::Ledger {
            orphaned_cid: None,
            source,
        }
    }
}

impl From<RegistryError> for PipelineError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::InvalidInput(msg) => PipelineError::InvalidInput(msg),
            RegistryError::NotFound(device_id) => PipelineError::Authentication(device_id),
            other => PipelineError::Registry(other),
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
