//! Token claims decoding port

/// Claims embedded in a self-contained token.
pub type Claims = serde_json::Map<String, serde_json::Value>;

/// Best-effort decoder of token claims.
///
/// Decoding never fails: malformed input yields empty claims. Claims are
/// not verified and are only a fallback source of identity and roles.
pub trait ClaimsDecoder: Send + Sync {
    /// Decodes the claims of `token`.
    fn decode(&self, token: &str) -> Claims;
}

/// Decoder for deployments whose tokens carry no readable claims.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClaimsDecoder;

impl ClaimsDecoder for NoClaimsDecoder {
    fn decode(&self, _token: &str) -> Claims {
        Claims::new()
    }
}
