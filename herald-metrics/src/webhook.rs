//! Webhook and suppression metrics

use std::sync::atomic::{AtomicU64, Ordering};

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Meter},
};

use crate::MetricsError;

#[derive(Debug)]
pub struct WebhookMetrics {
    /// Accepted callbacks by provider, event type and outcome
    events_total: Counter<u64>,

    /// Callbacks refused before normalization, by reason
    rejected_total: Counter<u64>,

    /// Suppression registry upserts by classification
    suppressions_total: Counter<u64>,

    rejected_count: AtomicU64,
}

impl WebhookMetrics {
    /// # Errors
    ///
    /// Returns an error if metric instruments cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        let meter = meter();

        let events_total = meter
            .u64_counter("herald.webhook.events.total")
            .with_description("Accepted webhook events by type and outcome")
            .build();

        let rejected_total = meter
            .u64_counter("herald.webhook.rejected.total")
            .with_description("Webhook callbacks refused before normalization")
            .build();

        let suppressions_total = meter
            .u64_counter("herald.suppression.upserts.total")
            .with_description("Suppression registry upserts by classification")
            .build();

        Ok(Self {
            events_total,
            rejected_total,
            suppressions_total,
            rejected_count: AtomicU64::new(0),
        })
    }

    pub fn record_event(&self, provider: &str, event_type: &str, outcome: &str) {
        self.events_total.add(
            1,
            &[
                KeyValue::new("provider", provider.to_string()),
                KeyValue::new("type", event_type.to_string()),
                KeyValue::new("outcome", outcome.to_string()),
            ],
        );
    }

    /// Record a callback refused with `reason` (`auth` or `parse`)
    pub fn record_rejected(&self, provider: &str, reason: &str) {
        self.rejected_total.add(
            1,
            &[
                KeyValue::new("provider", provider.to_string()),
                KeyValue::new("reason", reason.to_string()),
            ],
        );
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppression(&self, classification: &str) {
        self.suppressions_total
            .add(1, &[KeyValue::new("classification", classification.to_string())]);
    }

    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected_count.load(Ordering::Relaxed)
    }
}

fn meter() -> Meter {
    opentelemetry::global::meter("herald.webhook")
}
