//! Authentication error taxonomy.

use thiserror::Error;

use crate::request::HttpMethod;

/// Errors surfaced by login, refresh and replayed requests.
///
/// `Clone` so one refresh failure can be handed to every queued request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The login or refresh response carried no usable token.
    #[error("token missing in response: {message}")]
    TokenMissing {
        /// Server message, or a description of what was missing.
        message: String,
    },

    /// The principal holds none of the allowed roles.
    #[error("unauthorized role: {roles:?} not in allow-list")]
    UnauthorizedRole {
        /// The roles the principal actually holds.
        roles: Vec<String>,
    },

    /// The refresh call failed; the session was closed.
    #[error("token refresh failed: {message}")]
    RefreshFailed {
        /// Error description.
        message: String,
    },

    /// A request that was already replayed once received 401 again.
    #[error("{method} {url} was rejected again after token refresh")]
    ReplayUnauthorized {
        /// Method of the rejected request.
        method: HttpMethod,
        /// Target of the rejected request.
        url: String,
    },

    /// A 401 that cannot be recovered from (e.g. on the refresh endpoint itself).
    #[error("unauthenticated request to {url}")]
    Unauthenticated {
        /// Target of the rejected request.
        url: String,
    },

    /// The login endpoint answered with a non-success status.
    #[error("login rejected ({status}): {message}")]
    LoginRejected {
        /// HTTP status returned by the login endpoint.
        status: u16,
        /// Human-readable reason from the response body.
        message: String,
    },

    /// The login request body could not be built from the submitted fields.
    #[error("login payload could not be encoded: {message}")]
    InvalidLoginPayload {
        /// Encoder error description.
        message: String,
    },

    /// The transport failed before a response was received.
    #[error("network error: {message}")]
    Network {
        /// Error description.
        message: String,
    },

    /// The credential could not be persisted.
    #[error("credential storage error: {message}")]
    Storage {
        /// Error description.
        message: String,
    },
}

impl AuthError {
    /// Returns true if the error means the session is gone and the user must log in again.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::RefreshFailed { .. } | Self::Unauthenticated { .. } | Self::TokenMissing { .. }
        )
    }
}
