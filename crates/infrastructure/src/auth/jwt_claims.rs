//! JWT claims decoding.
//!
//! Reads the payload segment of a `header.payload.signature` token without
//! verifying the signature. The server stays authoritative; decoded claims
//! only fill in principal details a response body left out.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use serde_json::Value;
use tokenrelay_application::ports::{Claims, ClaimsDecoder};
use tracing::debug;

/// Decodes JWT payload claims. Malformed tokens yield no claims.
#[derive(Debug, Clone, Copy, Default)]
pub struct JwtClaimsDecoder;

impl JwtClaimsDecoder {
    /// Creates a decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn try_decode(token: &str) -> Option<Claims> {
        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_)) if segments.next().is_none() => payload,
            _ => return None,
        };
        let payload = payload.trim_end_matches('=');
        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .or_else(|_| STANDARD_NO_PAD.decode(payload))
            .ok()?;
        match serde_json::from_slice(&bytes).ok()? {
            Value::Object(claims) => Some(claims),
            _ => None,
        }
    }
}

impl ClaimsDecoder for JwtClaimsDecoder {
    fn decode(&self, token: &str) -> Claims {
        Self::try_decode(token).unwrap_or_else(|| {
            debug!("token is not a decodable JWT, no claims");
            Claims::new()
        })
    }
}
