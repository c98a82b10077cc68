//! Token and principal extraction from login and refresh responses.

use serde_json::{Map, Value};
use tokenrelay_domain::{ApiResponse, Principal};

use crate::ports::{Claims, ClaimsDecoder};

/// Body fields that may carry the token, in precedence order.
const TOKEN_FIELDS: [&str; 3] = ["token", "accessToken", "jwt"];

/// Body fields that may hold the principal object.
const PRINCIPAL_OBJECTS: [&str; 3] = ["user", "account", "principal"];

/// Fields naming the principal inside a body object.
const USERNAME_FIELDS: [&str; 2] = ["username", "email"];

/// Fields listing roles inside a body object.
const ROLE_FIELDS: [&str; 2] = ["roles", "authorities"];

/// Claims naming the principal, in precedence order.
const USERNAME_CLAIMS: [&str; 3] = ["sub", "username", "email"];

/// Claims listing roles, in precedence order.
const ROLE_CLAIMS: [&str; 4] = ["roles", "authorities", "scope", "scopes"];

/// Body fields that may carry a human-readable error.
const MESSAGE_FIELDS: [&str; 4] = ["message", "error_description", "error", "detail"];

/// Extracts the bearer token: body fields first, then the `Authorization` header.
#[must_use]
pub fn extract_token(response: &ApiResponse) -> Option<String> {
    let from_body = response
        .json_object()
        .and_then(|body| string_field(&body, &TOKEN_FIELDS));
    from_body.or_else(|| {
        response.header("authorization").and_then(|value| {
            let (scheme, token) = value.split_once(' ')?;
            let token = token.trim();
            (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty())
                .then(|| token.to_string())
        })
    })
}

/// Extracts the principal from the response body, falling back to token claims.
///
/// Claims are only decoded when the body lacks a username or roles.
/// `fallback_username` is used when neither names the principal. Returns
/// `None` when no username and no role could be found.
#[must_use]
pub fn extract_principal(
    response: &ApiResponse,
    token: &str,
    decoder: &dyn ClaimsDecoder,
    fallback_username: Option<&str>,
) -> Option<Principal> {
    let body = response.json_object().unwrap_or_default();
    let user = PRINCIPAL_OBJECTS
        .iter()
        .find_map(|field| body.get(*field).and_then(Value::as_object));

    let mut username = user
        .and_then(|u| string_field(u, &USERNAME_FIELDS))
        .or_else(|| string_field(&body, &USERNAME_FIELDS));
    let mut roles = user
        .and_then(|u| first_present(u, &ROLE_FIELDS))
        .or_else(|| first_present(&body, &ROLE_FIELDS))
        .map(role_names)
        .unwrap_or_default();

    if username.is_none() || roles.is_empty() {
        let claims = decoder.decode(token);
        if roles.is_empty() {
            roles = roles_from_claims(&claims);
        }
        if username.is_none() {
            username = string_field(&claims, &USERNAME_CLAIMS);
        }
    }

    let username = username.or_else(|| fallback_username.map(str::to_string));
    if username.is_none() && roles.is_empty() {
        return None;
    }
    Some(Principal::new(username.unwrap_or_default(), roles))
}

/// Reads roles from the conventional role claims.
#[must_use]
pub fn roles_from_claims(claims: &Claims) -> Vec<String> {
    first_present(claims, &ROLE_CLAIMS)
        .map(role_names)
        .unwrap_or_default()
}

/// Extracts a human-readable error message from a JSON error body.
#[must_use]
pub fn extract_error_message(response: &ApiResponse) -> Option<String> {
    response
        .json_object()
        .and_then(|body| string_field(&body, &MESSAGE_FIELDS))
}

/// Reduces a role list to role names.
///
/// Accepts a space/comma separated string, or an array of strings and
/// objects carrying `name`, `role` or `authority`.
fn role_names(value: &Value) -> Vec<String> {
    match value {
        Value::String(list) => list
            .split([' ', ','])
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(role) => Some(role.clone()),
                Value::Object(obj) => string_field(obj, &["name", "role", "authority"]),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn string_field(map: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| {
        map.get(*field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn first_present<'a>(map: &'a Map<String, Value>, fields: &[&str]) -> Option<&'a Value> {
    fields
        .iter()
        .find_map(|field| map.get(*field).filter(|v| !v.is_null()))
}
