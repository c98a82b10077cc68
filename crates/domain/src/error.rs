//! Domain error types

use thiserror::Error;

/// Domain-level errors that can occur during validation or processing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The HTTP method is not supported.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// The payload encoding name is not recognised.
    #[error("unsupported payload encoding: {0}")]
    UnsupportedEncoding(String),

    /// The refresh credential name is not recognised.
    #[error("unsupported refresh credential: {0}")]
    UnsupportedRefreshCredential(String),
}

/// Result type alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
