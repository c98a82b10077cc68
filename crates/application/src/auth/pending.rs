//! Requests waiting on a refresh.

use tokenrelay_domain::{ApiRequest, ApiResponse, AuthError};
use tokio::sync::oneshot;
use tracing::debug;

/// Outcome delivered to the caller of a queued request.
pub type Outcome = Result<ApiResponse, AuthError>;

/// A request that received 401 and waits for the refresh to resolve.
///
/// Holds the one-shot half that answers the original caller. Consuming
/// methods take `self`, so an entry is answered at most once.
#[derive(Debug)]
pub struct PendingRequest {
    request: ApiRequest,
    responder: oneshot::Sender<Outcome>,
}

impl PendingRequest {
    /// Creates an entry and the receiver its caller awaits.
    #[must_use]
    pub fn new(request: ApiRequest) -> (Self, oneshot::Receiver<Outcome>) {
        let (responder, receiver) = oneshot::channel();
        (Self { request, responder }, receiver)
    }

    /// Returns the waiting request.
    #[must_use]
    pub const fn request(&self) -> &ApiRequest {
        &self.request
    }

    /// Returns true if the caller stopped waiting.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.responder.is_closed()
    }

    /// Answers the caller.
    pub fn resolve(self, outcome: Outcome) {
        let id = self.request.id;
        if self.responder.send(outcome).is_err() {
            debug!(request_id = %id, "caller stopped waiting before the outcome arrived");
        }
    }

    /// Splits the entry so the request can be replayed before answering.
    #[must_use]
    pub fn into_parts(self) -> (ApiRequest, oneshot::Sender<Outcome>) {
        (self.request, self.responder)
    }
}
