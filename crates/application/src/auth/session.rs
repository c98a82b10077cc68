//! Login and logout.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokenrelay_domain::{
    ApiRequest, ApiResponse, AuthError, AuthSettings, Credential, PayloadEncoding, Principal,
    RequestBody, RoleAllowList,
};
use tracing::{info, warn};

use super::credential_store::CredentialStore;
use super::extract::{extract_error_message, extract_principal, extract_token};
use crate::ports::{ClaimsDecoder, HttpTransport};

/// Opens and closes sessions against the login endpoint.
#[derive(Clone)]
pub struct AuthSession {
    settings: Arc<AuthSettings>,
    allow_list: RoleAllowList,
    transport: Arc<dyn HttpTransport>,
    store: CredentialStore,
    decoder: Arc<dyn ClaimsDecoder>,
}

impl AuthSession {
    /// Creates a session manager writing into `store`.
    #[must_use]
    pub fn new(
        settings: Arc<AuthSettings>,
        transport: Arc<dyn HttpTransport>,
        store: CredentialStore,
        decoder: Arc<dyn ClaimsDecoder>,
    ) -> Self {
        Self {
            allow_list: settings.allow_list(),
            settings,
            transport,
            store,
            decoder,
        }
    }

    /// Logs in and stores the resulting credential.
    ///
    /// On any failure the store is cleared before the error is returned.
    ///
    /// # Errors
    ///
    /// - `Network` if the login endpoint cannot be reached.
    /// - `LoginRejected` if it answers with a non-success status.
    /// - `TokenMissing` if the response carries no token.
    /// - `UnauthorizedRole` if the principal holds no allowed role.
    /// - `Storage` if the credential cannot be persisted.
    pub async fn login(&self, username: &str, password: &str) -> Result<Principal, AuthError> {
        match self.try_login(username, password).await {
            Ok(principal) => {
                info!(username = %principal.username, roles = ?principal.roles, "logged in");
                Ok(principal)
            }
            Err(error) => {
                warn!(username = %username, error = %error, "login failed");
                self.logout();
                Err(error)
            }
        }
    }

    /// Clears the stored credential. Safe to call repeatedly.
    pub fn logout(&self) {
        let was_authenticated = self.store.is_authenticated();
        self.store.clear();
        if was_authenticated {
            info!("logged out");
        }
    }

    /// Returns the stored credential.
    #[must_use]
    pub fn current(&self) -> Option<Credential> {
        self.store.get()
    }

    /// Returns true if the stored principal holds an allowed role.
    #[must_use]
    pub fn has_allowed_role(&self) -> bool {
        self.store
            .principal()
            .is_some_and(|p| self.allow_list.permits(&p))
    }

    async fn try_login(&self, username: &str, password: &str) -> Result<Principal, AuthError> {
        let request = ApiRequest::post(self.settings.login_path.clone())
            .with_body(self.login_payload(username, password)?);
        let response = self.transport.send(&request).await?;

        if !response.is_success() {
            return Err(AuthError::LoginRejected {
                status: response.status.as_u16(),
                message: rejection_message(&response),
            });
        }

        let token = extract_token(&response).ok_or_else(|| AuthError::TokenMissing {
            message: extract_error_message(&response)
                .unwrap_or_else(|| "login response carried no token".to_string()),
        })?;
        let principal = extract_principal(&response, &token, self.decoder.as_ref(), Some(username))
            .unwrap_or_else(|| Principal::new(username, Vec::<String>::new()));

        if !self.allow_list.permits(&principal) {
            return Err(AuthError::UnauthorizedRole {
                roles: principal.roles.iter().cloned().collect(),
            });
        }

        self.store
            .set(Credential::new(token, Some(principal.clone())))?;
        Ok(principal)
    }

    fn login_payload(&self, username: &str, password: &str) -> Result<RequestBody, AuthError> {
        let fields = [
            (self.settings.username_field.as_str(), username),
            (self.settings.password_field.as_str(), password),
        ];
        match self.settings.payload_encoding {
            PayloadEncoding::Json => {
                let object: Map<String, Value> = fields
                    .iter()
                    .map(|(name, value)| ((*name).to_string(), Value::from(*value)))
                    .collect();
                Ok(RequestBody::json(Value::Object(object).to_string()))
            }
            PayloadEncoding::Form => serde_urlencoded::to_string(fields)
                .map(RequestBody::form)
                .map_err(form_error),
        }
    }
}

fn form_error(error: serde_urlencoded::ser::Error) -> AuthError {
    AuthError::InvalidLoginPayload {
        message: error.to_string(),
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("login_path", &self.settings.login_path)
            .field("allow_list", &self.allow_list)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

fn rejection_message(response: &ApiResponse) -> String {
    extract_error_message(response)
        .unwrap_or_else(|| response.status.reason_phrase().to_string())
}
