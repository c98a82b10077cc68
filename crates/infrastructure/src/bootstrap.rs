//! Client wiring.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokenrelay_application::auth::{CredentialStore, StorageKeys};
use tokenrelay_application::ports::{
    InMemoryKeyValueStore, KeyValueStore, StorageError, TransportError,
};
use tokenrelay_application::AuthClient;
use tokenrelay_domain::AuthSettings;
use tracing::info;

use crate::adapters::ReqwestTransport;
use crate::auth::JwtClaimsDecoder;
use crate::config::{ConfigError, load_settings};
use crate::persistence::FileKeyValueStore;

/// Errors raised while assembling a client.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Settings could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP transport could not be created.
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),

    /// The credential file could not be opened.
    #[error("credential storage setup failed: {0}")]
    Storage(#[from] StorageError),
}

/// Builds a client over reqwest, persisting credentials at `store_path`.
///
/// Without a path credentials live in memory only. A session persisted by an
/// earlier run is restored.
///
/// # Errors
///
/// Returns an error if the base URL is invalid or the credential file is unreadable.
pub fn build_client(
    settings: AuthSettings,
    store_path: Option<&Path>,
) -> Result<AuthClient, BootstrapError> {
    let transport = Arc::new(ReqwestTransport::new(&settings)?);
    let backend: Arc<dyn KeyValueStore> = match store_path {
        Some(path) => Arc::new(FileKeyValueStore::open(path)?),
        None => Arc::new(InMemoryKeyValueStore::new()),
    };
    let store = CredentialStore::open(backend, StorageKeys::from_settings(&settings));
    info!(
        base_url = %settings.base_url,
        persistent = store_path.is_some(),
        restored = store.is_authenticated(),
        "client ready"
    );
    Ok(AuthClient::new(
        settings,
        transport,
        store,
        Arc::new(JwtClaimsDecoder::new()),
    ))
}

/// Loads settings from `config_path` and the environment, then builds a
/// client persisting credentials at the platform default location.
///
/// # Errors
///
/// Returns an error if settings cannot be loaded or the client cannot be built.
pub fn build_default_client(config_path: Option<&Path>) -> Result<AuthClient, BootstrapError> {
    let settings = load_settings(config_path)?;
    let store_path = FileKeyValueStore::default_location();
    build_client(settings, store_path.as_deref())
}
