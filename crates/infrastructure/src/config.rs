//! Settings loading.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. an optional settings file (format from its extension)
//! 3. `TOKENRELAY_*` environment variables, e.g. `TOKENRELAY_LOGIN_PATH`

use std::path::Path;

use ::config::{Config, Environment, File, Map};
use thiserror::Error;
use tokenrelay_domain::AuthSettings;
use tracing::debug;

/// Prefix of environment variables overriding settings.
pub const ENV_PREFIX: &str = "TOKENRELAY";

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or merged.
    #[error("failed to load configuration: {0}")]
    Load(#[source] ::config::ConfigError),

    /// The merged values do not form valid settings.
    #[error("invalid configuration: {0}")]
    Invalid(#[source] ::config::ConfigError),
}

/// Loads settings from `path` (if given and present) and the environment.
///
/// # Errors
///
/// Returns an error if the file is malformed or a value has the wrong type.
pub fn load_settings(path: Option<&Path>) -> Result<AuthSettings, ConfigError> {
    load_with_env(path, None)
}

/// Like [`load_settings`], reading variables from `env` instead of the process
/// environment when given.
///
/// # Errors
///
/// Returns an error if the file is malformed or a value has the wrong type.
pub fn load_with_env(
    path: Option<&Path>,
    env: Option<Map<String, String>>,
) -> Result<AuthSettings, ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        debug!(path = %path.display(), "loading settings file");
        builder = builder.add_source(File::from(path).required(false));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .source(env),
    );

    let merged = builder.build().map_err(ConfigError::Load)?;
    merged.try_deserialize().map_err(ConfigError::Invalid)
}
