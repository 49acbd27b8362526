//! Error types and result handling for registry and ledger operations.
//!
//! Validation errors are synchronous and immediate: malformed endpoint
//! definitions are rejected before registration and never reach delivery.
//! Delivery-time failures are not errors at this layer; they are recorded
//! as attempt outcomes.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for store operations.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Malformed input rejected before it reached any store.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Operation referenced an unknown endpoint or event ID.
    #[error("not found: {0}")]
    NotFound(String),
}

impl CoreError {
    /// Creates a validation error from a message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a not-found error from a message.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Whether this is a validation rejection.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Whether this is a missing-entity error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
