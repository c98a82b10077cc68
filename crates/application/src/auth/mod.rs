//! Authentication core.
//!
//! This module provides:
//! - Credential storage with paired token/principal writes
//! - Request tagging with the bearer credential
//! - Single-flight token refresh and replay of failed requests
//! - Login and logout

mod coordinator;
mod credential_store;
mod extract;
mod pending;
mod replay;
mod session;
mod tagger;

pub use coordinator::{RefreshCoordinator, RefreshState};
pub use credential_store::{CredentialStore, StorageKeys};
pub use extract::{extract_error_message, extract_principal, extract_token, roles_from_claims};
pub use pending::{Outcome, PendingRequest};
pub use replay::ReplayDispatcher;
pub use session::AuthSession;
pub use tagger::RequestTagger;
