//! Delivery metrics
//!
//! Tracks outbound sends including:
//! - Provider call attempts by outcome
//! - Send durations by provider
//! - Workflows by terminal state
//! - Workflows currently in flight

use std::sync::atomic::{AtomicU64, Ordering};

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter, UpDownCounter},
};

use crate::MetricsError;

/// Delivery metrics collector
#[derive(Debug)]
pub struct DeliveryMetrics {
    /// Provider call attempts by outcome
    attempts_total: Counter<u64>,

    /// Distribution of provider call durations
    duration_seconds: Histogram<f64>,

    /// Workflows that reached a terminal state, by state
    workflows_total: Counter<u64>,

    /// Sends skipped because an earlier attempt already reached the provider
    reused_total: Counter<u64>,

    /// Distribution of attempts needed per finished workflow
    attempts_per_workflow: Histogram<u64>,

    /// Workflows started but not yet finished
    active_workflows: UpDownCounter<i64>,

    active_count: AtomicU64,
}

impl DeliveryMetrics {
    /// Create a new delivery metrics collector
    ///
    /// # Errors
    ///
    /// Returns an error if metric instruments cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        let meter = meter();

        let attempts_total = meter
            .u64_counter("herald.delivery.attempts.total")
            .with_description("Provider call attempts by outcome")
            .build();

        let duration_seconds = meter
            .f64_histogram("herald.delivery.duration.seconds")
            .with_description("Distribution of provider call durations")
            .build();

        let workflows_total = meter
            .u64_counter("herald.delivery.workflows.total")
            .with_description("Workflows that reached a terminal state")
            .build();

        let reused_total = meter
            .u64_counter("herald.delivery.reused.total")
            .with_description("Sends answered from an existing delivery record")
            .build();

        let attempts_per_workflow = meter
            .u64_histogram("herald.delivery.workflow.attempts")
            .with_description("Attempts needed per finished workflow")
            .build();

        let active_workflows = meter
            .i64_up_down_counter("herald.delivery.workflows.active")
            .with_description("Workflows started but not yet finished")
            .build();

        Ok(Self {
            attempts_total,
            duration_seconds,
            workflows_total,
            reused_total,
            attempts_per_workflow,
            active_workflows,
            active_count: AtomicU64::new(0),
        })
    }

    /// Record one provider call
    pub fn record_attempt(&self, provider: &str, outcome: &str, duration_secs: f64) {
        let attributes = [
            KeyValue::new("provider", provider.to_string()),
            KeyValue::new("outcome", outcome.to_string()),
        ];
        self.attempts_total.add(1, &attributes);
        self.duration_seconds.record(duration_secs, &attributes[..1]);
    }

    /// Record a send satisfied by an existing delivery record
    pub fn record_reused(&self) {
        self.reused_total.add(1, &[]);
    }

    pub fn record_workflow_started(&self) {
        self.active_workflows.add(1, &[]);
        self.active_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a workflow reaching `state` after `attempts` provider calls
    pub fn record_workflow_finished(&self, state: &str, attempts: u32) {
        self.workflows_total
            .add(1, &[KeyValue::new("state", state.to_string())]);
        self.attempts_per_workflow.record(u64::from(attempts), &[]);
        self.active_workflows.add(-1, &[]);

        // Saturate rather than wrap if a recovered workflow finishes without
        // having been counted as started in this process.
        let _ = self
            .active_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    #[must_use]
    pub fn active_workflows(&self) -> u64 {
        self.active_count.load(Ordering::Relaxed)
    }
}

fn meter() -> Meter {
    opentelemetry::global::meter("herald.delivery")
}
