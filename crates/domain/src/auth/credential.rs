//! Credentials, principals and role normalization.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Conventional prefix some servers put in front of role names.
const ROLE_PREFIX: &str = "ROLE_";

/// Default allow-list when none is configured.
pub const DEFAULT_ALLOWED_ROLES: &str = "ADMIN,MODERATOR";

/// Normalizes a role name for exact-match comparison.
///
/// Roles are trimmed, upper-cased and stripped of the `ROLE_` prefix.
/// Returns `None` when nothing is left.
#[must_use]
pub fn normalize_role(raw: &str) -> Option<String> {
    let upper = raw.trim().to_uppercase();
    let role = upper.strip_prefix(ROLE_PREFIX).unwrap_or(&upper).trim();
    if role.is_empty() {
        None
    } else {
        Some(role.to_string())
    }
}

/// The authenticated identity behind a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Login name or e-mail.
    pub username: String,
    /// Normalized role names.
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl Principal {
    /// Creates a principal, normalizing every role.
    pub fn new<I, S>(username: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            username: username.into(),
            roles: roles
                .into_iter()
                .filter_map(|r| normalize_role(r.as_ref()))
                .collect(),
        }
    }

    /// Returns true if the principal holds the given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        normalize_role(role).is_some_and(|r| self.roles.contains(&r))
    }
}

/// A bearer token together with the principal it was issued for.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// The opaque bearer token.
    pub token: String,
    /// The principal, when the server or the token claims named one.
    pub principal: Option<Principal>,
}

impl Credential {
    /// Creates a credential.
    #[must_use]
    pub fn new(token: impl Into<String>, principal: Option<Principal>) -> Self {
        Self {
            token: token.into(),
            principal,
        }
    }

    /// Returns the `Authorization` header value for this credential.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        bearer(&self.token)
    }

    /// Returns a short, log-safe preview of the token.
    #[must_use]
    pub fn token_preview(&self) -> String {
        token_preview(&self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &self.token_preview())
            .field("principal", &self.principal)
            .finish()
    }
}

/// Formats a bearer `Authorization` header value.
#[must_use]
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Get a preview of a token (first 8 chars + ...).
#[must_use]
pub fn token_preview(token: &str) -> String {
    if token.chars().count() > 12 {
        let head: String = token.chars().take(8).collect();
        format!("{head}...")
    } else {
        token.to_string()
    }
}

/// Roles that are allowed to hold a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAllowList {
    roles: BTreeSet<String>,
}

impl RoleAllowList {
    /// Parses a comma-separated role list.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        Self {
            roles: list.split(',').filter_map(normalize_role).collect(),
        }
    }

    /// Returns the normalized allowed roles.
    #[must_use]
    pub const fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    /// Returns true if the principal holds at least one allowed role.
    #[must_use]
    pub fn permits(&self, principal: &Principal) -> bool {
        !self.roles.is_disjoint(&principal.roles)
    }
}

impl Default for RoleAllowList {
    fn default() -> Self {
        Self::parse(DEFAULT_ALLOWED_ROLES)
    }
}
