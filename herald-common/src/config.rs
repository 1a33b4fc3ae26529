//! Configuration primitives shared by every crate

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is not set")]
    MissingEnv(String),

    #[error("Secret for {0} is empty")]
    EmptySecret(String),

    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// A secret given inline or read from the environment at startup.
///
/// ```ron
/// api_key: Env("HERALD_PROVIDER_KEY"),
/// secret: Inline("whsec_..."),
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Secret {
    Inline(String),
    Env(String),
}

impl Secret {
    /// Resolve the secret value.
    ///
    /// # Errors
    ///
    /// Fails if the variable is unset or the value is empty.
    pub fn resolve(&self, name: &str) -> Result<String, ConfigError> {
        let value = match self {
            Self::Inline(value) => value.clone(),
            Self::Env(var) => {
                std::env::var(var).map_err(|_| ConfigError::MissingEnv(var.clone()))?
            }
        };

        if value.is_empty() {
            return Err(ConfigError::EmptySecret(name.to_string()));
        }

        Ok(value)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(_) => f.write_str("Inline(<redacted>)"),
            Self::Env(var) => f.debug_tuple("Env").field(var).finish(),
        }
    }
}
