//! Health check logic

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use herald_common::internal;
use serde::Serialize;

/// Tracks whether each part of the service can take traffic
///
/// Components flip their flag once started; the in-flight count is refreshed
/// by the readiness probe.
#[derive(Debug)]
pub struct HealthChecker {
    /// Whether the stores were opened
    storage_ready: AtomicBool,

    /// Whether the orchestrator has recovered and takes new workflows
    orchestrator_ready: AtomicBool,

    /// Whether webhook verifiers are loaded
    webhooks_ready: AtomicBool,

    /// Workflows with a live task
    in_flight: AtomicUsize,

    max_in_flight: usize,
}

impl HealthChecker {
    #[must_use]
    pub const fn new(max_in_flight: usize) -> Self {
        Self {
            storage_ready: AtomicBool::new(false),
            orchestrator_ready: AtomicBool::new(false),
            webhooks_ready: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            max_in_flight,
        }
    }

    pub fn set_storage_ready(&self, ready: bool) {
        self.storage_ready.store(ready, Ordering::Relaxed);
        internal!(level = DEBUG, ready, "Storage readiness updated");
    }

    pub fn set_orchestrator_ready(&self, ready: bool) {
        self.orchestrator_ready.store(ready, Ordering::Relaxed);
        internal!(level = DEBUG, ready, "Orchestrator readiness updated");
    }

    pub fn set_webhooks_ready(&self, ready: bool) {
        self.webhooks_ready.store(ready, Ordering::Relaxed);
        internal!(level = DEBUG, ready, "Webhook readiness updated");
    }

    pub fn set_in_flight(&self, count: usize) {
        self.in_flight.store(count, Ordering::Relaxed);
    }

    /// Answering at all is proof of life.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        true
    }

    /// All components ready and the in-flight count below its threshold.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let status = self.status();
        status.storage_ready
            && status.orchestrator_ready
            && status.webhooks_ready
            && status.in_flight < status.max_in_flight
    }

    #[must_use]
    pub fn status(&self) -> HealthStatus {
        HealthStatus {
            alive: self.is_alive(),
            storage_ready: self.storage_ready.load(Ordering::Relaxed),
            orchestrator_ready: self.orchestrator_ready.load(Ordering::Relaxed),
            webhooks_ready: self.webhooks_ready.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            max_in_flight: self.max_in_flight,
        }
    }
}

/// Detailed health status information
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(
    clippy::struct_excessive_bools,
    reason = "One flag per component keeps the probe output readable"
)]
pub struct HealthStatus {
    pub alive: bool,
    pub storage_ready: bool,
    pub orchestrator_ready: bool,
    pub webhooks_ready: bool,
    pub in_flight: usize,
    pub max_in_flight: usize,
}
