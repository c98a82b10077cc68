//! Tokenrelay Domain - Core types
//!
//! This crate defines the domain model of the bearer-token access layer:
//! requests and responses as the layer sees them, credentials, principals,
//! role allow-lists, settings and the authentication error taxonomy.
//! All types here are pure Rust with no I/O dependencies.

pub mod auth;
pub mod error;
pub mod request;
pub mod response;

pub use auth::{
    AuthError, AuthSettings, Credential, PayloadEncoding, Principal, RefreshCredential,
    RoleAllowList,
};
pub use error::{DomainError, DomainResult};
pub use request::{ApiRequest, HttpMethod, RequestBody};
pub use response::{ApiResponse, StatusCode};
