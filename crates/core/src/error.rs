//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// workflow misuse). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed snapshot).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested workflow action is not allowed from the current state.
    #[error("invalid transition: cannot {action} a {from} request")]
    InvalidTransition { action: &'static str, from: String },

    /// The target is in a terminal state and can no longer change.
    #[error("request is already terminal ({status})")]
    AlreadyTerminal { status: String },

    /// A requested resource was not found (domain-level).
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition(action: &'static str, from: impl Into<String>) -> Self {
        Self::InvalidTransition {
            action,
            from: from.into(),
        }
    }

    pub fn already_terminal(status: impl Into<String>) -> Self {
        Self::AlreadyTerminal {
            status: status.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
