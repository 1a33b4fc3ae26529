//! Metrics configuration

use serde::Deserialize;

/// Configuration for metrics collection and export
///
/// ```ron
/// metrics: (
///     enabled: true,
///     endpoint: "http://otel-collector:4318/v1/metrics",
/// ),
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// When disabled, every recording call is a no-op.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// OTLP/HTTP endpoint metrics are pushed to.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

const fn default_enabled() -> bool {
    false
}

fn default_endpoint() -> String {
    "http://localhost:4318/v1/metrics".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: default_endpoint(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_defaults() {
        let config: MetricsConfig = ron::from_str("()").unwrap();
        assert!(!config.enabled);
        assert_eq!(config.endpoint, "http://localhost:4318/v1/metrics");
    }

    #[test]
    fn test_enabled() {
        let config: MetricsConfig =
            ron::from_str(r#"(enabled: true, endpoint: "http://collector:4318/v1/metrics")"#)
                .unwrap();
        assert!(config.enabled);
        assert_eq!(config.endpoint, "http://collector:4318/v1/metrics");
    }
}
