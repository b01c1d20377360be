//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (bad arguments,
/// illegal transitions). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An argument failed validation at construction time (empty id, malformed email).
    #[error("invalid argument `{field}`: {message}")]
    ArgumentInvalid {
        field: &'static str,
        message: String,
    },

    /// An aggregate was asked to perform a transition its current state forbids.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested aggregate was not found (domain-level).
    #[error("not found")]
    NotFound,
}

impl DomainError {
    pub fn argument(field: &'static str, message: impl Into<String>) -> Self {
        Self::ArgumentInvalid {
            field,
            message: message.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Whether this error signals an illegal state transition.
    ///
    /// Workflows that treat a specific transition as idempotent match on this.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState(_))
    }
}
