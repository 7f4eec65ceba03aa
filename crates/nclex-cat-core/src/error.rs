//! Session error types.
//!
//! Every operation on the session controller returns one of these. Errors
//! are local to one session: none of them leaves another session or the
//! shared item bank in a modified state (apart from the bank's atomic
//! exposure counters).

use thiserror::Error;
use uuid::Uuid;

use crate::model::ItemId;

/// Errors surfaced by the adaptive testing engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatError {
    /// No session is registered under this id.
    #[error("session not found: {0}")]
    SessionNotFound(Uuid),

    /// The session has completed and can no longer be mutated.
    #[error("session already completed: {0}")]
    SessionAlreadyCompleted(Uuid),

    /// The session is still active, so no result exists yet.
    #[error("session still active: {0}")]
    SessionActive(Uuid),

    /// The submitted option ids are malformed for this item.
    #[error("invalid answer for item {item}: {reason}")]
    InvalidAnswer { item: ItemId, reason: String },

    /// The answer was submitted for an item that is not the current question.
    #[error("unexpected question {received}, current question is {expected:?}")]
    UnexpectedQuestion {
        expected: Option<ItemId>,
        received: ItemId,
    },

    /// No eligible item remains in the bank.
    #[error("item bank exhausted: no eligible item remains")]
    ExhaustedBank,

    /// The ability estimate or its uncertainty was not finite.
    #[error("estimation failed: {0}")]
    Estimation(String),

    /// A restored or stored session violates the aggregate's invariants.
    #[error("invalid session state: {0}")]
    InvalidSessionState(String),

    /// Another submission for the same session is in flight.
    #[error("concurrent modification of session {0}, retry")]
    ConcurrentModification(Uuid),
}

impl CatError {
    /// Returns `true` if the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatError::ConcurrentModification(_))
    }

    /// Returns `true` if this error terminates the session it occurred in.
    pub fn is_fatal_for_session(&self) -> bool {
        matches!(self, CatError::Estimation(_))
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, CatError>;
