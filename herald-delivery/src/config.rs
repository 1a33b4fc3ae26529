use herald_common::{
    config::{ConfigError, Secret},
    internal,
};
use rand::Rng;
use serde::Deserialize;

use crate::{
    activities::TokenSigner,
    policy::{ActivityOptions, RetryPolicy},
};

mod defaults {
    pub const fn max_concurrent_sends() -> usize {
        16
    }
}

/// Workflow execution settings
///
/// ```ron
/// delivery: (
///     retry: (max_attempts: 3, initial_backoff_secs: 1, max_backoff_secs: 30),
///     activity: (start_to_close_secs: 300, heartbeat_timeout_secs: 60),
///     max_concurrent_sends: 16,
///     token_secret: Some(Env("HERALD_TOKEN_SECRET")),
/// ),
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub activity: ActivityOptions,

    /// Workflows allowed in `Sending` at once. Scheduled workflows do not
    /// count against this until their wait is over.
    #[serde(default = "defaults::max_concurrent_sends")]
    pub max_concurrent_sends: usize,

    /// Secret for invitation tokens. Without one a random secret is used,
    /// and tokens do not survive a restart.
    #[serde(default)]
    pub token_secret: Option<Secret>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            activity: ActivityOptions::default(),
            max_concurrent_sends: defaults::max_concurrent_sends(),
            token_secret: None,
        }
    }
}

impl DeliveryConfig {
    /// # Errors
    ///
    /// Fails if the configured secret cannot be resolved.
    pub fn token_signer(&self) -> Result<TokenSigner, ConfigError> {
        match &self.token_secret {
            Some(secret) => Ok(TokenSigner::new(
                secret.resolve("delivery.token_secret")?,
            )),
            None => {
                internal!(
                    level = WARN,
                    "No delivery.token_secret configured, invitation tokens will not survive a restart"
                );
                let mut secret = [0u8; 32];
                rand::rng().fill(&mut secret);
                Ok(TokenSigner::new(secret.to_vec()))
            }
        }
    }

    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for settings that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_sends == 0 {
            return Err(ConfigError::Invalid {
                field: "delivery.max_concurrent_sends".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "delivery.retry.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(ConfigError::Invalid {
                field: "delivery.retry.jitter_factor".to_string(),
                reason: "must be between 0.0 and 1.0".to_string(),
            });
        }
        Ok(())
    }
}
