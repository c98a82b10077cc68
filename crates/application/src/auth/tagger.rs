//! Request tagging.

use tokenrelay_domain::auth::bearer;
use tokenrelay_domain::request::AUTHORIZATION;
use tokenrelay_domain::{ApiRequest, AuthSettings};
use tracing::debug;

/// Attaches the bearer credential to outgoing requests.
///
/// Requests to the login and refresh endpoints are never tagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTagger {
    login_path: String,
    refresh_path: String,
}

impl RequestTagger {
    /// Creates a tagger excluding the given endpoint paths.
    #[must_use]
    pub fn new(login_path: impl Into<String>, refresh_path: impl Into<String>) -> Self {
        Self {
            login_path: login_path.into(),
            refresh_path: refresh_path.into(),
        }
    }

    /// Creates a tagger from the configured endpoint paths.
    #[must_use]
    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self::new(settings.login_path.clone(), settings.refresh_path.clone())
    }

    /// Tags `request` with `token`.
    ///
    /// Excluded requests are returned unchanged, as are requests when no
    /// token is held: those go out unauthenticated and the server decides.
    #[must_use]
    pub fn tag(&self, mut request: ApiRequest, token: Option<&str>) -> ApiRequest {
        if self.is_excluded(&request) {
            debug!(request_id = %request.id, url = %request.url, "excluded from tagging");
            return request;
        }
        if let Some(token) = token {
            request.headers.set(AUTHORIZATION, bearer(token));
        }
        request
    }

    /// Returns true if the request targets the login or refresh endpoint.
    #[must_use]
    pub fn is_excluded(&self, request: &ApiRequest) -> bool {
        self.is_login(request) || self.is_refresh(request)
    }

    /// Returns true if the request targets the login endpoint.
    #[must_use]
    pub fn is_login(&self, request: &ApiRequest) -> bool {
        path_matches(&request.path(), &self.login_path)
    }

    /// Returns true if the request targets the refresh endpoint.
    #[must_use]
    pub fn is_refresh(&self, request: &ApiRequest) -> bool {
        path_matches(&request.path(), &self.refresh_path)
    }
}

/// Matches `path` against an endpoint path, allowing a prefix (API base or
/// version segment) in front of it. Trailing slashes are ignored.
fn path_matches(path: &str, endpoint: &str) -> bool {
    let path = path.trim_end_matches('/');
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.is_empty() {
        return false;
    }
    path.strip_suffix(endpoint).is_some_and(|prefix| {
        prefix.is_empty() || prefix.ends_with('/') || endpoint.starts_with('/')
    })
}
