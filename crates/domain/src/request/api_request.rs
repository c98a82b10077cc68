//! Outgoing request description

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use super::{Headers, HttpMethod, RequestBody};

/// A replayable description of an outgoing HTTP request.
///
/// `url` is either absolute or a path that the transport resolves against
/// its base URL. Cloning a request keeps its `id`, so a replay can be traced
/// back to the original call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRequest {
    /// Identifier used to correlate log lines of one logical request
    pub id: Uuid,
    /// HTTP method
    pub method: HttpMethod,
    /// Absolute URL or path relative to the transport base
    pub url: String,
    /// HTTP headers
    #[serde(default)]
    pub headers: Headers,
    /// Request body
    #[serde(default)]
    pub body: RequestBody,
    /// Set once the request has been re-issued after a refresh
    #[serde(default)]
    replay: bool,
}

impl ApiRequest {
    /// Creates a request with no headers and no body.
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            method,
            url: url.into(),
            headers: Headers::new(),
            body: RequestBody::none(),
            replay: false,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Creates a POST request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    /// Creates a PUT request.
    #[must_use]
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, url)
    }

    /// Creates a DELETE request.
    #[must_use]
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Adds or replaces a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Returns true if this request is a replay of an earlier failed request.
    #[must_use]
    pub const fn is_replay(&self) -> bool {
        self.replay
    }

    /// Marks the request as a replay. A replay is never retried again.
    #[must_use]
    pub const fn into_replay(mut self) -> Self {
        self.replay = true;
        self
    }

    /// Returns the path component of the target, without query or fragment.
    #[must_use]
    pub fn path(&self) -> String {
        if let Ok(parsed) = Url::parse(&self.url) {
            return parsed.path().to_string();
        }
        let end = self.url.find(['?', '#']).unwrap_or(self.url.len());
        self.url[..end].to_string()
    }
}
