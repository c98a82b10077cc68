//! Single-flight token refresh.
//!
//! A request answered with 401 is handed to the [`RefreshCoordinator`]. The
//! first one moves the coordinator from `Idle` to `Refreshing` and spawns the
//! only refresh call; every 401 arriving meanwhile is queued behind it. When
//! the refresh resolves the queue is drained in FIFO order: replayed with the
//! new token on success, failed with the refresh error (and the session
//! cleared) otherwise.
//!
//! A refresh only writes back into the store it read from: a logout or
//! login completing while the call is in flight wins over its result. A
//! token whose refresh failed is remembered, so a late 401 carrying it is
//! failed at once instead of starting another refresh.
//!
//! State and queue sit under one mutex that is never held across an await.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokenrelay_domain::request::AUTHORIZATION;
use tokenrelay_domain::{
    ApiRequest, ApiResponse, AuthError, AuthSettings, Credential, RefreshCredential,
};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::credential_store::CredentialStore;
use super::extract::{extract_error_message, extract_principal, extract_token};
use super::pending::{Outcome, PendingRequest};
use super::replay::ReplayDispatcher;
use super::tagger::RequestTagger;
use crate::ports::{ClaimsDecoder, HttpTransport};

/// Refresh state of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshState {
    /// No refresh call in flight.
    #[default]
    Idle,
    /// A refresh call is in flight; 401s are queued.
    Refreshing,
}

#[derive(Debug, Default)]
struct Queue {
    state: RefreshState,
    pending: VecDeque<PendingRequest>,
    refreshes: u64,
    failed: Option<(String, AuthError)>,
}

/// Store contents a refresh started from.
#[derive(Debug)]
struct Attempt {
    previous: Option<Credential>,
    generation: u64,
}

impl Attempt {
    fn token(&self) -> Option<&str> {
        self.previous.as_ref().map(|c| c.token.as_str())
    }
}

struct Shared {
    queue: Mutex<Queue>,
    settings: Arc<AuthSettings>,
    transport: Arc<dyn HttpTransport>,
    store: CredentialStore,
    decoder: Arc<dyn ClaimsDecoder>,
    tagger: RequestTagger,
    dispatcher: ReplayDispatcher,
}

/// What to do with a 401 once the lock is released.
enum Next {
    Replay { request: ApiRequest, token: String },
    Wait(oneshot::Receiver<Outcome>),
    Fail(AuthError),
}

/// Coordinates token refresh for one client.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    shared: Arc<Shared>,
}

impl RefreshCoordinator {
    /// Creates a coordinator in the `Idle` state.
    #[must_use]
    pub fn new(
        settings: Arc<AuthSettings>,
        transport: Arc<dyn HttpTransport>,
        store: CredentialStore,
        decoder: Arc<dyn ClaimsDecoder>,
    ) -> Self {
        let tagger = RequestTagger::from_settings(&settings);
        let dispatcher = ReplayDispatcher::new(Arc::clone(&transport), tagger.clone());
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue::default()),
                settings,
                transport,
                store,
                decoder,
                tagger,
                dispatcher,
            }),
        }
    }

    /// Returns the current refresh state.
    #[must_use]
    pub fn state(&self) -> RefreshState {
        self.shared.queue.lock().state
    }

    /// Returns the number of requests waiting on the refresh in flight.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().pending.len()
    }

    /// Returns how many refresh calls this coordinator has issued.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.shared.queue.lock().refreshes
    }

    /// Returns the replay dispatcher shared with this coordinator.
    #[must_use]
    pub fn dispatcher(&self) -> &ReplayDispatcher {
        &self.shared.dispatcher
    }

    /// Recovers from a 401 received by `request`.
    ///
    /// `sent_token` is the token the request was tagged with. The returned
    /// outcome is the one logical response the caller observes.
    ///
    /// # Errors
    ///
    /// - `ReplayUnauthorized` if `request` was already a replay.
    /// - `Unauthenticated` if `request` targeted the refresh endpoint.
    /// - `RefreshFailed` if the refresh this request waited on failed.
    /// - any error of the replay itself.
    pub async fn recover(
        &self,
        request: ApiRequest,
        response: ApiResponse,
        sent_token: Option<&str>,
    ) -> Outcome {
        if request.is_replay() {
            warn!(request_id = %request.id, url = %request.url, "replayed request rejected again");
            return Err(AuthError::ReplayUnauthorized {
                method: request.method,
                url: request.url,
            });
        }
        if self.shared.tagger.is_refresh(&request) {
            return Err(AuthError::Unauthenticated { url: request.url });
        }
        if self.shared.tagger.is_login(&request) {
            return Ok(response);
        }

        match self.enqueue(request, sent_token) {
            Next::Replay { request, token } => self.shared.dispatcher.replay(request, &token).await,
            Next::Wait(receiver) => receiver.await.unwrap_or_else(|_| {
                Err(AuthError::RefreshFailed {
                    message: "refresh ended without answering the request".to_string(),
                })
            }),
            Next::Fail(error) => Err(error),
        }
    }

    fn enqueue(&self, request: ApiRequest, sent_token: Option<&str>) -> Next {
        let mut queue = self.shared.queue.lock();
        if queue.state == RefreshState::Idle {
            if let Some(current) = self.shared.store.token()
                && sent_token != Some(current.as_str())
            {
                debug!(request_id = %request.id, "token changed since dispatch, replaying without refresh");
                return Next::Replay {
                    request,
                    token: current,
                };
            }
            if let Some((failed, error)) = &queue.failed
                && sent_token == Some(failed.as_str())
            {
                debug!(request_id = %request.id, "refresh already failed for this token");
                return Next::Fail(error.clone());
            }
        }

        let id = request.id;
        let (pending, receiver) = PendingRequest::new(request);
        queue.pending.push_back(pending);
        match queue.state {
            RefreshState::Idle => {
                queue.state = RefreshState::Refreshing;
                queue.refreshes += 1;
                let (previous, generation) = self.shared.store.snapshot();
                debug!(request_id = %id, "starting token refresh");
                tokio::spawn(run_refresh(
                    Arc::clone(&self.shared),
                    Attempt {
                        previous,
                        generation,
                    },
                ));
            }
            RefreshState::Refreshing => {
                debug!(request_id = %id, queued = queue.pending.len(), "refresh in flight, request queued");
            }
        }
        Next::Wait(receiver)
    }
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.shared.queue.lock();
        f.debug_struct("RefreshCoordinator")
            .field("state", &queue.state)
            .field("queued", &queue.pending.len())
            .field("refreshes", &queue.refreshes)
            .finish()
    }
}

/// Fails the queue if the refresh task ends without resolving it.
struct AbortGuard {
    shared: Option<Arc<Shared>>,
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            let error = AuthError::RefreshFailed {
                message: "refresh task aborted".to_string(),
            };
            warn!("refresh task ended early, session kept");
            reject_all(&shared, &error);
        }
    }
}

async fn run_refresh(shared: Arc<Shared>, attempt: Attempt) {
    let mut guard = AbortGuard {
        shared: Some(Arc::clone(&shared)),
    };
    let outcome = refresh(&shared, &attempt).await;
    guard.shared = None;
    finish(&shared, &attempt, outcome);
}

/// Issues the refresh call and turns its response into a credential.
async fn refresh(shared: &Shared, attempt: &Attempt) -> Result<Credential, AuthError> {
    let mut request = ApiRequest::post(shared.settings.refresh_path.clone());
    if shared.settings.refresh_credential == RefreshCredential::Bearer
        && let Some(previous) = &attempt.previous
    {
        request
            .headers
            .set(AUTHORIZATION, previous.authorization_header());
    }

    let response = shared
        .transport
        .send(&request)
        .await
        .map_err(|e| AuthError::RefreshFailed {
            message: e.to_string(),
        })?;
    if !response.is_success() {
        return Err(AuthError::RefreshFailed {
            message: extract_error_message(&response)
                .unwrap_or_else(|| format!("refresh endpoint answered {}", response.status)),
        });
    }

    let token = extract_token(&response).ok_or_else(|| AuthError::RefreshFailed {
        message: AuthError::TokenMissing {
            message: "refresh response carried no token".to_string(),
        }
        .to_string(),
    })?;

    let previous_principal = attempt.previous.as_ref().and_then(|c| c.principal.clone());
    let fallback = previous_principal.as_ref().map(|p| p.username.as_str());
    let principal = match extract_principal(&response, &token, shared.decoder.as_ref(), fallback)
    {
        Some(p) if !p.roles.is_empty() || previous_principal.is_none() => Some(p),
        _ => previous_principal,
    };
    Ok(Credential::new(token, principal))
}

/// Writes a refreshed credential back unless the session changed meanwhile.
///
/// Returns the token queued requests are replayed with: the refreshed one,
/// or the one a login stored while the refresh was in flight.
fn store_refreshed(
    shared: &Shared,
    attempt: &Attempt,
    credential: Credential,
) -> Result<String, AuthError> {
    let token = credential.token.clone();
    let stored = shared
        .store
        .set_if_generation(credential, attempt.generation)
        .map_err(|e| AuthError::RefreshFailed {
            message: format!("refreshed credential could not be stored: {e}"),
        })?;
    if stored {
        return Ok(token);
    }
    shared.store.token().ok_or_else(|| AuthError::RefreshFailed {
        message: "session closed during refresh".to_string(),
    })
}

/// Stores the outcome, returns to `Idle` and drains the queue.
fn finish(shared: &Shared, attempt: &Attempt, outcome: Result<Credential, AuthError>) {
    let outcome = outcome.and_then(|credential| store_refreshed(shared, attempt, credential));
    match outcome {
        Ok(token) => {
            let drained = {
                let mut queue = shared.queue.lock();
                queue.state = RefreshState::Idle;
                queue.failed = None;
                std::mem::take(&mut queue.pending)
            };
            info!(replaying = drained.len(), "token refreshed");
            let token: Arc<str> = Arc::from(token);
            for pending in drained {
                shared.dispatcher.dispatch(pending, Arc::clone(&token));
            }
        }
        Err(error) => {
            if !shared.store.clear_if_generation(attempt.generation) {
                debug!("session changed during refresh, leaving it in place");
            }
            if let Some(token) = attempt.token() {
                shared.queue.lock().failed = Some((token.to_string(), error.clone()));
            }
            warn!(error = %error, "token refresh failed, session cleared");
            reject_all(shared, &error);
        }
    }
}

/// Returns to `Idle` and fails every queued request with `error`.
fn reject_all(shared: &Shared, error: &AuthError) {
    let drained = {
        let mut queue = shared.queue.lock();
        queue.state = RefreshState::Idle;
        std::mem::take(&mut queue.pending)
    };
    debug!(failing = drained.len(), "rejecting queued requests");
    for pending in drained {
        ReplayDispatcher::reject(pending, error.clone());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::testing::{RefreshScript, ScriptedTransport, alice, client_with};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn unauthorized() -> ApiResponse {
        ApiResponse::json(401, &json!({ "message": "unauthorized" }))
    }

    #[test]
    fn test_starts_idle() {
        let transport = Arc::new(ScriptedTransport::new("fresh", RefreshScript::Issue("fresh")));
        let client = client_with(AuthSettings::default(), &transport, Some("fresh"));

        assert_eq!(client.coordinator().state(), RefreshState::Idle);
        assert_eq!(client.coordinator().refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_outdated_token_is_replayed_without_refresh() {
        let transport = Arc::new(ScriptedTransport::new("fresh", RefreshScript::Issue("other")));
        let client = client_with(AuthSettings::default(), &transport, Some("fresh"));
        let request = ApiRequest::get("/api/news").with_header(AUTHORIZATION, "Bearer old");

        let response = client
            .coordinator()
            .recover(request, unauthorized(), Some("old"))
            .await
            .unwrap();

        assert_eq!(response.status.as_u16(), 200);
        assert_eq!(client.coordinator().refresh_count(), 0);
        assert_eq!(transport.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_replayed_request_does_not_refresh_again() {
        let transport = Arc::new(ScriptedTransport::new("fresh", RefreshScript::Issue("other")));
        let client = client_with(AuthSettings::default(), &transport, Some("fresh"));
        let request = ApiRequest::put("/api/users/7").into_replay();

        let error = client
            .coordinator()
            .recover(request, unauthorized(), Some("fresh"))
            .await
            .unwrap_err();

        assert!(matches!(error, AuthError::ReplayUnauthorized { .. }));
        assert_eq!(transport.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_keeps_principal_when_response_has_no_roles() {
        let transport = Arc::new(ScriptedTransport::new("not-issued", RefreshScript::Issue("fresh")));
        let client = client_with(AuthSettings::default(), &transport, Some("expired"));

        client.send(ApiRequest::get("/api/news")).await.unwrap();

        let credential = client.credential().unwrap();
        assert_eq!(credential.token, "fresh");
        assert_eq!(credential.principal, Some(alice()));
        assert_eq!(client.coordinator().refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_cookie_refresh_sends_no_bearer() {
        let transport = Arc::new(ScriptedTransport::new("not-issued", RefreshScript::Issue("fresh")));
        let client = client_with(AuthSettings::default(), &transport, Some("expired"));

        client.send(ApiRequest::get("/api/news")).await.unwrap();

        let refreshes = transport.requests_to("/api/user/refresh");
        assert_eq!(refreshes.len(), 1);
        assert_eq!(refreshes[0].method, tokenrelay_domain::HttpMethod::Post);
        assert!(!refreshes[0].headers.contains(AUTHORIZATION));
    }

    #[tokio::test]
    async fn test_bearer_refresh_sends_stored_token() {
        let settings = AuthSettings {
            refresh_credential: RefreshCredential::Bearer,
            ..AuthSettings::default()
        };
        let transport = Arc::new(ScriptedTransport::with_settings(
            settings.clone(),
            "not-issued",
            RefreshScript::Issue("fresh"),
        ));
        let client = client_with(settings, &transport, Some("expired"));

        client.send(ApiRequest::get("/api/news")).await.unwrap();

        let refreshes = transport.requests_to("/api/user/refresh");
        assert_eq!(refreshes[0].headers.get(AUTHORIZATION), Some("Bearer expired"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_logout_during_refresh_is_not_undone() {
        let transport = Arc::new(ScriptedTransport::new("not-issued", RefreshScript::Issue("fresh")));
        let client = client_with(AuthSettings::default(), &transport, Some("expired"));

        let pending = {
            let client = client.clone();
            tokio::spawn(async move { client.send(ApiRequest::get("/api/news")).await })
        };
        while client.coordinator().state() != RefreshState::Refreshing {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        client.logout();

        let error = pending.await.unwrap().unwrap_err();
        assert_eq!(
            error,
            AuthError::RefreshFailed {
                message: "session closed during refresh".to_string()
            }
        );
        assert!(client.credential().is_none());
        assert_eq!(transport.refresh_calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_late_401_after_failed_refresh_does_not_refresh_again() {
        let transport = Arc::new(ScriptedTransport::new("not-issued", RefreshScript::Fail(500)));
        transport.set_refresh_delay(Duration::from_millis(20));
        transport.delay("/api/slow", Duration::from_millis(200));
        let client = client_with(AuthSettings::default(), &transport, Some("expired"));

        let (fast, slow) = tokio::join!(
            client.send(ApiRequest::get("/api/news")),
            client.send(ApiRequest::get("/api/slow")),
        );

        let expected = AuthError::RefreshFailed {
            message: "refresh token expired".to_string(),
        };
        assert_eq!(fast.unwrap_err(), expected);
        assert_eq!(slow.unwrap_err(), expected);
        assert_eq!(transport.refresh_calls(), 1);
        assert_eq!(client.coordinator().refresh_count(), 1);
        assert!(client.credential().is_none());
    }

    #[tokio::test]
    async fn test_aborted_refresh_fails_queue_but_keeps_session() {
        let transport = Arc::new(ScriptedTransport::new("fresh", RefreshScript::Issue("fresh")));
        let client = client_with(AuthSettings::default(), &transport, Some("fresh"));
        let shared = Arc::clone(&client.coordinator().shared);
        let (pending, receiver) = PendingRequest::new(ApiRequest::get("/api/news"));
        {
            let mut queue = shared.queue.lock();
            queue.state = RefreshState::Refreshing;
            queue.pending.push_back(pending);
        }

        drop(AbortGuard {
            shared: Some(Arc::clone(&shared)),
        });

        let error = receiver.await.unwrap().unwrap_err();
        assert!(matches!(error, AuthError::RefreshFailed { .. }));
        assert_eq!(client.coordinator().state(), RefreshState::Idle);
        assert_eq!(client.credential().map(|c| c.token).as_deref(), Some("fresh"));
    }
}
