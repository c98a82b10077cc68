//! Replay of requests after a refresh.

use std::fmt;
use std::sync::Arc;

use tokenrelay_domain::{ApiRequest, ApiResponse, AuthError};
use tracing::{debug, warn};

use super::pending::PendingRequest;
use super::tagger::RequestTagger;
use crate::ports::HttpTransport;

/// Re-issues failed requests with a refreshed token, exactly once each.
#[derive(Clone)]
pub struct ReplayDispatcher {
    transport: Arc<dyn HttpTransport>,
    tagger: RequestTagger,
}

impl ReplayDispatcher {
    /// Creates a dispatcher sending through `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, tagger: RequestTagger) -> Self {
        Self { transport, tagger }
    }

    /// Replays `request` tagged with `token`.
    ///
    /// The request is marked as a replay first, so a second 401 is final.
    ///
    /// # Errors
    ///
    /// Returns `ReplayUnauthorized` if the server rejects the replay with 401,
    /// or `Network` if the transport fails.
    pub async fn replay(&self, request: ApiRequest, token: &str) -> Result<ApiResponse, AuthError> {
        let request = self.tagger.tag(request.into_replay(), Some(token));
        debug!(request_id = %request.id, method = %request.method, url = %request.url, "replaying request");

        let response = self.transport.send(&request).await?;
        if response.is_unauthorized() {
            warn!(request_id = %request.id, url = %request.url, "replayed request rejected again");
            return Err(AuthError::ReplayUnauthorized {
                method: request.method,
                url: request.url,
            });
        }
        Ok(response)
    }

    /// Spawns the replay of a drained entry and answers its caller with the outcome.
    ///
    /// Entries whose caller already stopped waiting are not sent.
    pub fn dispatch(&self, pending: PendingRequest, token: Arc<str>) {
        if pending.is_abandoned() {
            debug!(request_id = %pending.request().id, "skipping replay for abandoned request");
            return;
        }
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let (request, responder) = pending.into_parts();
            let id = request.id;
            let outcome = dispatcher.replay(request, &token).await;
            if responder.send(outcome).is_err() {
                debug!(request_id = %id, "caller stopped waiting during replay");
            }
        });
    }

    /// Answers a drained entry with an error instead of replaying it.
    pub fn reject(pending: PendingRequest, error: AuthError) {
        pending.resolve(Err(error));
    }
}

impl fmt::Debug for ReplayDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayDispatcher")
            .field("tagger", &self.tagger)
            .finish_non_exhaustive()
    }
}
