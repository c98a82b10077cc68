//! Tokenrelay Application - Access layer core
//!
//! This crate defines:
//! - Port traits for the transport, durable storage and claims decoding
//! - The credential store, request tagger, refresh coordinator and replay dispatcher
//! - The [`AuthClient`] facade tying them together

pub mod auth;
pub mod client;
pub mod ports;

#[cfg(test)]
mod testing;

pub use auth::{
    AuthSession, CredentialStore, PendingRequest, RefreshCoordinator, RefreshState,
    ReplayDispatcher, RequestTagger, StorageKeys,
};
pub use client::AuthClient;
pub use ports::{
    Claims, ClaimsDecoder, HttpTransport, InMemoryKeyValueStore, KeyValueStore, NoClaimsDecoder,
    StorageError, TransportError,
};
