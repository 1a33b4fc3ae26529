use std::{sync::Arc, time::Duration};

use herald_common::config::{ConfigError, Secret};
use serde::Deserialize;

use crate::{EmailProvider, HttpProvider, MockProvider, ProviderGateway};

mod defaults {
    pub fn http_name() -> String {
        "http".to_string()
    }

    pub const fn timeout_secs() -> u64 {
        30
    }
}

/// Which provider the gateway talks to
///
/// ```ron
/// gateway: (
///     provider: Http(
///         base_url: "https://api.provider.example/v1",
///         api_key: Env("HERALD_PROVIDER_KEY"),
///         timeout_secs: 10,
///     ),
///     default_from: Some("Herald <noreply@example.com>"),
/// ),
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub enum ProviderConfig {
    #[default]
    Mock,
    Http {
        #[serde(default = "defaults::http_name")]
        name: String,
        base_url: String,
        api_key: Secret,
        #[serde(default = "defaults::timeout_secs")]
        timeout_secs: u64,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub default_from: Option<String>,
}

impl GatewayConfig {
    /// Build the gateway, resolving secrets.
    ///
    /// # Errors
    ///
    /// Fails if the API key cannot be resolved or the HTTP client cannot be
    /// built.
    pub fn build(&self) -> Result<ProviderGateway, ConfigError> {
        let provider: Arc<dyn EmailProvider> = match &self.provider {
            ProviderConfig::Mock => Arc::new(MockProvider::new()),
            ProviderConfig::Http {
                name,
                base_url,
                api_key,
                timeout_secs,
            } => {
                if base_url.trim().is_empty() {
                    return Err(ConfigError::Invalid {
                        field: "gateway.provider.base_url".to_string(),
                        reason: "must not be empty".to_string(),
                    });
                }

                let api_key = api_key.resolve("gateway.provider.api_key")?;
                Arc::new(
                    HttpProvider::new(
                        name.clone(),
                        base_url,
                        api_key,
                        Duration::from_secs(*timeout_secs),
                    )
                    .map_err(|e| ConfigError::Invalid {
                        field: "gateway.provider".to_string(),
                        reason: e.to_string(),
                    })?,
                )
            }
        };

        let gateway = ProviderGateway::new(provider);
        Ok(match &self.default_from {
            Some(from) => gateway.with_default_from(from.clone()),
            None => gateway,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_http_provider() {
        let config: GatewayConfig = ron::from_str(
            r#"(
                provider: Http(
                    base_url: "https://api.example.com",
                    api_key: Inline("key"),
                ),
                default_from: Some("noreply@example.com"),
            )"#,
        )
        .unwrap();

        let ProviderConfig::Http {
            name, timeout_secs, ..
        } = &config.provider
        else {
            panic!("expected Http provider");
        };
        assert_eq!(name, "http");
        assert_eq!(*timeout_secs, 30);

        let gateway = config.build().unwrap();
        assert_eq!(gateway.provider_name(), "http");
    }

    #[test]
    fn test_default_is_mock() {
        let config: GatewayConfig = ron::from_str("()").unwrap();
        assert_eq!(config.build().unwrap().provider_name(), "mock");
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let config = GatewayConfig {
            provider: ProviderConfig::Http {
                name: "http".to_string(),
                base_url: String::new(),
                api_key: Secret::Inline("k".to_string()),
                timeout_secs: 1,
            },
            default_from: None,
        };
        assert!(matches!(config.build(), Err(ConfigError::Invalid { .. })));
    }
}
