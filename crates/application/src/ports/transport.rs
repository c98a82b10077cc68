//! HTTP transport port

use async_trait::async_trait;
use thiserror::Error;
use tokenrelay_domain::{ApiRequest, ApiResponse, AuthError};

/// Errors raised by a transport before a response is received.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The target could not be turned into a URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The request timed out.
    #[error("request timed out after {timeout_ms} ms")]
    Timeout {
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// No connection could be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The body could not be sent.
    #[error("invalid body: {0}")]
    InvalidBody(String),

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

impl From<TransportError> for AuthError {
    fn from(error: TransportError) -> Self {
        Self::Network {
            message: error.to_string(),
        }
    }
}

/// Port for sending HTTP requests.
///
/// Implementations send the request exactly as given: tagging, refresh and
/// replay all happen above this port. Any HTTP status, including 401, is a
/// successful send.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends the request and returns the response.
    ///
    /// # Errors
    ///
    /// Returns an error if no response could be obtained (network failure,
    /// timeout, malformed target).
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}
