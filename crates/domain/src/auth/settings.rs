//! Access layer settings
//!
//! Every field has a default so partial configuration files and
//! environment overrides deserialize cleanly.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::credential::{DEFAULT_ALLOWED_ROLES, RoleAllowList};
use crate::error::DomainError;

/// How the login payload is encoded.
///
/// Names are read case-insensitively; `form-urlencoded` and `urlencoded`
/// are accepted for `form`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum PayloadEncoding {
    /// `application/json` object (default).
    #[default]
    Json,
    /// `application/x-www-form-urlencoded` pairs.
    Form,
}

impl FromStr for PayloadEncoding {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "form" | "form-urlencoded" | "urlencoded" => Ok(Self::Form),
            other => Err(DomainError::UnsupportedEncoding(other.to_string())),
        }
    }
}

impl TryFrom<String> for PayloadEncoding {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// What authenticates the refresh call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum RefreshCredential {
    /// The transport cookie jar carries a refresh cookie; no bearer header is sent.
    #[default]
    Cookie,
    /// The stored (expired) bearer token is sent on the refresh call.
    Bearer,
}

impl FromStr for RefreshCredential {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cookie" => Ok(Self::Cookie),
            "bearer" => Ok(Self::Bearer),
            other => Err(DomainError::UnsupportedRefreshCredential(other.to_string())),
        }
    }
}

impl TryFrom<String> for RefreshCredential {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Configuration of the access layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Base URL that relative request paths are resolved against.
    pub base_url: String,
    /// Path of the login endpoint. Never tagged.
    pub login_path: String,
    /// Path of the refresh endpoint. Never tagged, never recovered.
    pub refresh_path: String,
    /// Name of the username field in the login payload.
    pub username_field: String,
    /// Name of the password field in the login payload.
    pub password_field: String,
    /// Encoding of the login payload.
    pub payload_encoding: PayloadEncoding,
    /// Comma-separated roles allowed to hold a session.
    pub allowed_roles: String,
    /// Credential presented on the refresh call.
    pub refresh_credential: RefreshCredential,
    /// Durable key the token is stored under.
    pub token_key: String,
    /// Durable key the principal is stored under.
    pub principal_key: String,
    /// Transport timeout in milliseconds.
    pub timeout_ms: u64,
    /// User-Agent sent by the transport.
    pub user_agent: String,
}

impl AuthSettings {
    /// Returns the parsed role allow-list.
    #[must_use]
    pub fn allow_list(&self) -> RoleAllowList {
        RoleAllowList::parse(&self.allowed_roles)
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            login_path: "/api/user/login".to_string(),
            refresh_path: "/api/user/refresh".to_string(),
            username_field: "username".to_string(),
            password_field: "password".to_string(),
            payload_encoding: PayloadEncoding::default(),
            allowed_roles: DEFAULT_ALLOWED_ROLES.to_string(),
            refresh_credential: RefreshCredential::default(),
            token_key: "auth_token".to_string(),
            principal_key: "auth_user".to_string(),
            timeout_ms: 30_000,
            user_agent: concat!("tokenrelay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
