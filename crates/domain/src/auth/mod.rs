//! Authentication domain types

mod credential;
mod error;
mod settings;

pub use credential::{
    Credential, DEFAULT_ALLOWED_ROLES, Principal, RoleAllowList, bearer, normalize_role,
    token_preview,
};
pub use error::AuthError;
pub use settings::{AuthSettings, PayloadEncoding, RefreshCredential};
