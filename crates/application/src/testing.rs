//! Scripted transport for unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokenrelay_domain::auth::bearer;
use tokenrelay_domain::request::AUTHORIZATION;
use tokenrelay_domain::{ApiRequest, ApiResponse, AuthSettings, Credential, Principal};

use crate::auth::CredentialStore;
use crate::client::AuthClient;
use crate::ports::{HttpTransport, NoClaimsDecoder, TransportError};

/// How the fake server answers refresh calls.
#[derive(Debug, Clone)]
pub enum RefreshScript {
    /// 200 with this token in the body; the token becomes the valid one.
    Issue(&'static str),
    /// The given status with an error message.
    Fail(u16),
    /// 200 without any token.
    Missing,
    /// Transport failure.
    NetworkError,
}

/// In-process fake of the API server.
///
/// Data endpoints answer 200 to the currently valid token and 401 otherwise.
#[derive(Debug)]
pub struct ScriptedTransport {
    settings: AuthSettings,
    valid_token: Mutex<String>,
    refresh: Mutex<RefreshScript>,
    refresh_delay: Mutex<Duration>,
    delays: Mutex<HashMap<String, Duration>>,
    login: Mutex<Option<ApiResponse>>,
    always_unauthorized: Mutex<HashSet<String>>,
    requests: Mutex<Vec<ApiRequest>>,
    refresh_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(valid_token: &str, refresh: RefreshScript) -> Self {
        Self::with_settings(AuthSettings::default(), valid_token, refresh)
    }

    pub fn with_settings(settings: AuthSettings, valid_token: &str, refresh: RefreshScript) -> Self {
        Self {
            settings,
            valid_token: Mutex::new(valid_token.to_string()),
            refresh: Mutex::new(refresh),
            refresh_delay: Mutex::new(Duration::from_millis(100)),
            delays: Mutex::new(HashMap::new()),
            login: Mutex::new(None),
            always_unauthorized: Mutex::new(HashSet::new()),
            requests: Mutex::new(Vec::new()),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    pub fn answer_login(&self, response: ApiResponse) {
        *self.login.lock() = Some(response);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock() = delay;
    }

    /// Holds answers for `path` back by `delay`.
    pub fn delay(&self, path: &str, delay: Duration) {
        self.delays.lock().insert(path.to_string(), delay);
    }

    pub fn reject_always(&self, path: &str) {
        self.always_unauthorized.lock().insert(path.to_string());
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path() == path)
            .collect()
    }

    async fn answer_refresh(&self) -> Result<ApiResponse, TransportError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.refresh_delay.lock();
        tokio::time::sleep(delay).await;
        let script = self.refresh.lock().clone();
        match script {
            RefreshScript::Issue(token) => {
                *self.valid_token.lock() = token.to_string();
                Ok(ApiResponse::json(200, &json!({ "token": token })))
            }
            RefreshScript::Fail(status) => Ok(ApiResponse::json(
                status,
                &json!({ "message": "refresh token expired" }),
            )),
            RefreshScript::Missing => Ok(ApiResponse::json(200, &json!({ "status": "ok" }))),
            RefreshScript::NetworkError => {
                Err(TransportError::ConnectionFailed("connection reset".to_string()))
            }
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.lock().push(request.clone());
        let path = request.path();

        if path == self.settings.login_path {
            let answer = self.login.lock().clone();
            return Ok(answer.unwrap_or_else(|| {
                ApiResponse::json(
                    200,
                    &json!({
                        "token": "login-token",
                        "user": { "username": "alice", "roles": ["ROLE_ADMIN"] }
                    }),
                )
            }));
        }
        if path == self.settings.refresh_path {
            return self.answer_refresh().await;
        }

        let delay = self.delays.lock().get(&path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let expected = bearer(&self.valid_token.lock());
        let authorized = request.headers.get(AUTHORIZATION) == Some(expected.as_str());
        if !authorized || self.always_unauthorized.lock().contains(&path) {
            return Ok(ApiResponse::json(401, &json!({ "message": "unauthorized" })));
        }
        Ok(ApiResponse::json(
            200,
            &json!({
                "method": request.method.as_str(),
                "path": path,
                "body": request.body.content,
            }),
        ))
    }
}

pub fn alice() -> Principal {
    Principal::new("alice", ["ADMIN"])
}

/// Builds a client whose store already holds `token` for alice.
pub fn client_with(
    settings: AuthSettings,
    transport: &Arc<ScriptedTransport>,
    token: Option<&str>,
) -> AuthClient {
    let store = CredentialStore::in_memory();
    if let Some(token) = token {
        store.set(Credential::new(token, Some(alice()))).unwrap();
    }
    let transport: Arc<dyn HttpTransport> = Arc::clone(transport) as Arc<dyn HttpTransport>;
    AuthClient::new(settings, transport, store, Arc::new(NoClaimsDecoder))
}
