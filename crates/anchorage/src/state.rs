//! Per-request state machine.
//!
//! ```text
//! Received -> Authenticated -> Verified -> Stored -> Anchored -> Completed
//!  |   \              \              \          \
//!  |    Rejected       Rejected       Failed     Failed
//!  |    (unregistered) (bad_signature) (storage) (ledger)
//!   \
//!    Failed(registry)
//! ```
//!
//! Stages never run out of order and a request never leaves a terminal state.
//! [`Progress`] enforces both while a request is being processed.

use std::fmt;

use serde::Serialize;

/// Why a request was refused before any network call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Unregistered,
    BadSignature,
}

/// Which backend failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The device registry could not answer the key lookup.
    Registry,
    Storage,
    Ledger,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum PipelineState {
    Received,
    Authenticated,
    Verified,
    Stored,
    Anchored,
    Completed,
    Rejected(RejectReason),
    Failed(FailureKind),
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::Completed | PipelineState::Rejected(_) | PipelineState::Failed(_)
        )
    }

    /// The next state on the success path.
    pub fn successor(self) -> Option<PipelineState> {
        match self {
            PipelineState::Received => Some(PipelineState::Authenticated),
            PipelineState::Authenticated => Some(PipelineState::Verified),
            PipelineState::Verified => Some(PipelineState::Stored),
            PipelineState::Stored => Some(PipelineState::Anchored),
            PipelineState::Anchored => Some(PipelineState::Completed),
            _ => None,
        }
    }

    /// Whether moving to `next` is a legal edge.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        match next {
            PipelineState::Rejected(RejectReason::Unregistered)
            | PipelineState::Failed(FailureKind::Registry) => self == PipelineState::Received,
            PipelineState::Rejected(RejectReason::BadSignature) => {
                self == PipelineState::Authenticated
            }
            PipelineState::Failed(FailureKind::Storage) => self == PipelineState::Verified,
            PipelineState::Failed(FailureKind::Ledger) => self == PipelineState::Stored,
            _ => self.successor() == Some(next),
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Received => f.write_str("received"),
            PipelineState::Authenticated => f.write_str("authenticated"),
            PipelineState::Verified => f.write_str("verified"),
            PipelineState::Stored => f.write_str("stored"),
            PipelineState::Anchored => f.write_str("anchored"),
            PipelineState::Completed => f.write_str("completed"),
            PipelineState::Rejected(RejectReason::Unregistered) => f.write_str("rejected(unregistered)"),
            PipelineState::Rejected(RejectReason::BadSignature) => f.write_str("rejected(bad_signature)"),
            PipelineState::Failed(FailureKind::Registry) => f.write_str("failed(registry)"),
            PipelineState::Failed(FailureKind::Storage) => f.write_str("failed(storage)"),
            PipelineState::Failed(FailureKind::Ledger) => f.write_str("failed(ledger)"),
        }
    }
}

/// One request's walk through the state machine, starting at `Received`.
///
/// Every move is checked with [`PipelineState::can_transition_to`]. An
/// illegal move is refused and leaves the state unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Progress {
    state: PipelineState,
    path: Vec<PipelineState>,
}

impl Progress {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Received,
            path: vec![PipelineState::Received],
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn path(&self) -> &[PipelineState] {
        &self.path
    }

    /// Move to `next`; `false` if the edge is illegal.
    pub fn enter(&mut self, next: PipelineState) -> bool {
        let legal = self.state.can_transition_to(next);
        debug_assert!(legal, "illegal transition {} -> {}", self.state, next);
        if legal {
            self.state = next;
            self.path.push(next);
        }
        legal
    }

    /// Move one step along the success path.
    pub fn advance(&mut self) -> bool {
        match self.state.successor() {
            Some(next) => self.enter(next),
            None => false,
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}
