use std::collections::{BTreeMap, HashMap};

use herald_common::config::{ConfigError, Secret};
use serde::Deserialize;

use crate::SignatureVerifier;

mod defaults {
    pub const fn tolerance_secs() -> u64 {
        300
    }
}

/// Webhook endpoints, one per provider
///
/// ```ron
/// webhooks: (
///     tolerance_secs: 300,
///     providers: {
///         "resend": (secret: Env("RESEND_WEBHOOK_SECRET")),
///     },
/// ),
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookConfig {
    /// Maximum distance between a callback's timestamp and now
    #[serde(default = "defaults::tolerance_secs")]
    pub tolerance_secs: u64,

    #[serde(default)]
    pub providers: BTreeMap<String, ProviderWebhook>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderWebhook {
    pub secret: Secret,
}

impl WebhookConfig {
    /// Resolve every provider secret.
    ///
    /// # Errors
    ///
    /// The first secret that cannot be resolved.
    pub fn verifiers(&self) -> Result<HashMap<String, SignatureVerifier>, ConfigError> {
        self.providers
            .iter()
            .map(|(provider, webhook)| {
                let secret = webhook
                    .secret
                    .resolve(&format!("webhooks.providers.{provider}.secret"))?;
                Ok((
                    provider.clone(),
                    SignatureVerifier::new(secret, self.tolerance_secs),
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_defaults() {
        let config: WebhookConfig = ron::from_str("()").unwrap();
        assert_eq!(config.tolerance_secs, 300);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_inline_secret() {
        let config: WebhookConfig = ron::from_str(
            r#"(tolerance_secs: 60, providers: { "resend": (secret: Inline("whsec")) })"#,
        )
        .unwrap();

        let verifiers = config.verifiers().unwrap();
        assert!(verifiers.contains_key("resend"));
    }

    #[test]
    fn test_missing_env_secret() {
        let config: WebhookConfig = ron::from_str(
            r#"(providers: { "resend": (secret: Env("HERALD_TEST_UNSET_WEBHOOK_SECRET")) })"#,
        )
        .unwrap();

        assert!(matches!(
            config.verifiers(),
            Err(ConfigError::MissingEnv(_))
        ));
    }
}
