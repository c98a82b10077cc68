//! Tokenrelay Infrastructure - Adapters and implementations
//!
//! This crate provides concrete implementations of the ports
//! defined in the application layer, settings loading and client wiring.

pub mod adapters;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod persistence;
pub mod serialization;

pub use adapters::ReqwestTransport;
pub use auth::JwtClaimsDecoder;
pub use bootstrap::{BootstrapError, build_client, build_default_client};
pub use config::{ConfigError, load_settings};
pub use persistence::FileKeyValueStore;
pub use serialization::{SerializationError, from_json_bytes, to_json_stable, to_json_stable_bytes};
