//! Authenticated HTTP client.
//!
//! The entry point presentation code talks to: it tags every request with
//! the current credential, sends it, and routes 401 answers through the
//! refresh coordinator so the caller sees one logical response.

use std::fmt;
use std::sync::Arc;

use tokenrelay_domain::{ApiRequest, ApiResponse, AuthError, AuthSettings, Credential, Principal};
use tracing::debug;

use crate::auth::{AuthSession, CredentialStore, RefreshCoordinator, RequestTagger};
use crate::ports::{ClaimsDecoder, HttpTransport};

/// HTTP client with bearer credentials and transparent token refresh.
///
/// Cheap to clone; clones share the credential store and coordinator.
#[derive(Clone)]
pub struct AuthClient {
    settings: Arc<AuthSettings>,
    transport: Arc<dyn HttpTransport>,
    store: CredentialStore,
    tagger: RequestTagger,
    coordinator: RefreshCoordinator,
    session: AuthSession,
}

impl AuthClient {
    /// Wires a client from its collaborators.
    #[must_use]
    pub fn new(
        settings: AuthSettings,
        transport: Arc<dyn HttpTransport>,
        store: CredentialStore,
        decoder: Arc<dyn ClaimsDecoder>,
    ) -> Self {
        let settings = Arc::new(settings);
        let tagger = RequestTagger::from_settings(&settings);
        let coordinator = RefreshCoordinator::new(
            Arc::clone(&settings),
            Arc::clone(&transport),
            store.clone(),
            Arc::clone(&decoder),
        );
        let session = AuthSession::new(
            Arc::clone(&settings),
            Arc::clone(&transport),
            store.clone(),
            decoder,
        );
        Self {
            settings,
            transport,
            store,
            tagger,
            coordinator,
            session,
        }
    }

    /// Sends a request with the current credential attached.
    ///
    /// Any status other than 401 is returned as-is. A 401 triggers (or joins)
    /// a token refresh and the request is replayed once with the new token.
    ///
    /// # Errors
    ///
    /// - `Network` if the transport fails.
    /// - `RefreshFailed` if the refresh this request depended on failed.
    /// - `ReplayUnauthorized` if the replay was rejected again.
    /// - `Unauthenticated` for a 401 from the refresh endpoint itself.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, AuthError> {
        let token = self.store.token();
        let request = self.tagger.tag(request, token.as_deref());
        let response = self.transport.send(&request).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }
        debug!(request_id = %request.id, url = %request.url, "request unauthorized");
        self.coordinator
            .recover(request, response, token.as_deref())
            .await
    }

    /// Logs in. See [`AuthSession::login`].
    ///
    /// # Errors
    ///
    /// Returns the login failure; the store is empty afterwards.
    pub async fn login(&self, username: &str, password: &str) -> Result<Principal, AuthError> {
        self.session.login(username, password).await
    }

    /// Logs out. Idempotent.
    pub fn logout(&self) {
        self.session.logout();
    }

    /// Returns the stored credential.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.session.current()
    }

    /// Returns true if the stored principal holds an allowed role.
    #[must_use]
    pub fn has_allowed_role(&self) -> bool {
        self.session.has_allowed_role()
    }

    /// Returns the settings the client was built with.
    #[must_use]
    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Returns the refresh coordinator.
    #[must_use]
    pub const fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Returns the credential store.
    #[must_use]
    pub const fn store(&self) -> &CredentialStore {
        &self.store
    }
}

impl fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthClient")
            .field("base_url", &self.settings.base_url)
            .field("store", &self.store)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}
