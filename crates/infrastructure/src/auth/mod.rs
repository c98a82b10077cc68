//! Claims decoding adapters.

mod jwt_claims;

pub use jwt_claims::JwtClaimsDecoder;
