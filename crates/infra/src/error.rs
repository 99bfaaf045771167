//! Error taxonomy for collaborator IO and engine operations.

use std::time::Duration;

use thiserror::Error;

use medstock_core::{DomainError, SupplierId};

/// Failure reported by a persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    /// Uniqueness or optimistic-concurrency check rejected the write.
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Failure reported by a transport collaborator (snapshot feed, supplier channel).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

/// Error surfaced by engine operations.
///
/// Every variant is cheap to clone so a single cycle result can be handed to
/// several coalesced callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Malformed input (bad snapshot data, empty medicine list, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Workflow action not allowed from the request's current status.
    #[error("invalid transition: cannot {action} a {from} request")]
    InvalidTransition { action: &'static str, from: String },

    /// The request is completed or cancelled; nothing was changed.
    #[error("request is already terminal ({status})")]
    AlreadyTerminal { status: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// A concurrent writer got there first.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Notifications are never sent to inactive suppliers.
    #[error("supplier {0} is inactive")]
    InactiveSupplier(SupplierId),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(StoreError),

    /// The operation exceeded its deadline and was abandoned.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The scheduler stopped before it could serve the request.
    #[error("scheduler stopped")]
    SchedulerStopped,
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => EngineError::Validation(msg),
            DomainError::InvalidTransition { action, from } => {
                EngineError::InvalidTransition { action, from }
            }
            DomainError::AlreadyTerminal { status } => EngineError::AlreadyTerminal { status },
            DomainError::NotFound(what) => EngineError::NotFound(what),
            DomainError::Conflict(msg) => EngineError::Conflict(msg),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => EngineError::Conflict(msg),
            other => EngineError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_kind() {
        let err: EngineError = DomainError::invalid_transition("complete", "pending").into();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        assert_eq!(err.to_string(), "invalid transition: cannot complete a pending request");

        let err: EngineError = DomainError::already_terminal("completed").into();
        assert!(matches!(err, EngineError::AlreadyTerminal { ref status } if status == "completed"));
    }

    #[test]
    fn store_conflicts_surface_as_conflicts() {
        let err: EngineError = StoreError::Conflict("stale version".into()).into();
        assert_eq!(err, EngineError::Conflict("stale version".into()));

        let err: EngineError = StoreError::Unavailable("db down".into()).into();
        assert!(matches!(err, EngineError::Store(StoreError::Unavailable(_))));
    }
}
