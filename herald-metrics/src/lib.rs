//! OpenTelemetry metrics for herald
//!
//! Metrics are pushed via OTLP to an OpenTelemetry Collector, which can expose
//! them in Prometheus format for scraping.
//!
//! # Features
//!
//! - **Delivery Metrics**: Provider attempts by outcome, send durations, workflows by terminal state
//! - **Webhook Metrics**: Events by type and outcome, rejected callbacks, suppression upserts
//!
//! # Architecture
//!
//! ```text
//! herald → OTLP/HTTP → OpenTelemetry Collector → Prometheus (scrape) → Grafana
//! ```
//!
//! When metrics are disabled nothing is installed and [`metrics`] returns
//! `None`, so every recording site costs a single atomic load.
//!
//! # Usage
//!
//! ```rust,no_run
//! use herald_metrics::{init_metrics, MetricsConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MetricsConfig {
//!     enabled: true,
//!     endpoint: "http://localhost:4318/v1/metrics".to_string(),
//! };
//!
//! init_metrics(&config)?;
//!
//! if let Some(metrics) = herald_metrics::metrics() {
//!     metrics.webhook.record_suppression("hard");
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod delivery;
mod error;
mod exporter;
mod webhook;

pub use config::MetricsConfig;
pub use delivery::DeliveryMetrics;
pub use error::MetricsError;
use once_cell::sync::OnceCell;
pub use webhook::WebhookMetrics;

/// Global metrics instance
static METRICS_INSTANCE: OnceCell<Metrics> = OnceCell::new();

/// Root metrics container
#[derive(Debug)]
pub struct Metrics {
    pub delivery: DeliveryMetrics,
    pub webhook: WebhookMetrics,
}

/// Initialize the metrics system
///
/// This must be called once at startup before any metrics are recorded.
/// If metrics are disabled in the config, this is a no-op.
///
/// # Errors
///
/// Returns an error if metrics initialization fails or if called multiple times.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        tracing::info!("Metrics collection is disabled");
        return Ok(());
    }

    tracing::info!(
        endpoint = %config.endpoint,
        "Initializing OpenTelemetry metrics with OTLP exporter"
    );

    let provider = exporter::init_otlp_exporter(&config.endpoint)?;
    opentelemetry::global::set_meter_provider(provider);

    let metrics = Metrics {
        delivery: DeliveryMetrics::new()?,
        webhook: WebhookMetrics::new()?,
    };

    METRICS_INSTANCE
        .set(metrics)
        .map_err(|_| MetricsError::AlreadyInitialized)?;

    tracing::info!("Metrics collection initialized successfully");

    Ok(())
}

/// The global metrics instance, if metrics were enabled at startup
#[must_use]
pub fn metrics() -> Option<&'static Metrics> {
    METRICS_INSTANCE.get()
}

/// Check if metrics are enabled
#[must_use]
pub fn is_enabled() -> bool {
    METRICS_INSTANCE.get().is_some()
}
