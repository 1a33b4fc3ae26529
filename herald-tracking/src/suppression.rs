use std::sync::Arc;

use chrono::Utc;
use herald_common::{
    address, audit, internal,
    ids::TenantId,
    suppression::{Classification, SuppressionEntry},
};
use herald_store::{ContactDirectory, SuppressionStore};

use crate::SuppressionError;

const MANUAL_REASON: &str = "Manually suppressed";

/// Addresses that must never be sent to again.
///
/// Entries are global, keyed by the lower-cased address. Recording an address
/// twice folds into one entry with a higher occurrence count.
#[derive(Debug, Clone)]
pub struct SuppressionRegistry {
    store: Arc<dyn SuppressionStore>,
    contacts: Arc<dyn ContactDirectory>,
}

impl SuppressionRegistry {
    pub fn new(store: Arc<dyn SuppressionStore>, contacts: Arc<dyn ContactDirectory>) -> Self {
        Self { store, contacts }
    }

    /// Record a bounce, complaint or provider suppression for `email`.
    ///
    /// The suppression is written first. Contacts that are still active are
    /// then moved to the matching status; a failure there is logged and does
    /// not undo the suppression.
    ///
    /// # Errors
    ///
    /// [`SuppressionError::InvalidAddress`] for malformed addresses, or the
    /// store error if the suppression itself could not be written.
    pub async fn record_bounce(
        &self,
        email: &str,
        classification: Classification,
        reason: impl Into<String>,
        tenant_id: Option<TenantId>,
    ) -> Result<SuppressionEntry, SuppressionError> {
        let email = address::normalize(email);
        address::validate(&email)?;

        let reason = reason.into();
        let entry = self
            .store
            .upsert(&email, classification, reason, tenant_id.clone(), Utc::now())
            .await?;

        audit::log_address_suppressed(
            &entry.email,
            classification.as_str(),
            entry.count,
            &entry.reason,
        );
        if let Some(metrics) = herald_metrics::metrics() {
            metrics.webhook.record_suppression(classification.as_str());
        }

        match self
            .contacts
            .mark_if_active(&email, tenant_id.as_ref(), classification.contact_status())
            .await
        {
            Ok(changed) => internal!(
                level = DEBUG,
                classification = %classification,
                changed,
                "Updated contact status after suppression"
            ),
            Err(e) => internal!(
                level = WARN,
                classification = %classification,
                error = %e,
                "Failed to update contact status; suppression kept"
            ),
        }

        Ok(entry)
    }

    /// Whether sends to `email` must be refused.
    pub async fn is_suppressed(&self, email: &str) -> Result<bool, SuppressionError> {
        Ok(self
            .store
            .get(&address::normalize(email))
            .await?
            .is_some_and(|entry| entry.active))
    }

    pub async fn get(&self, email: &str) -> Result<Option<SuppressionEntry>, SuppressionError> {
        Ok(self.store.get(&address::normalize(email)).await?)
    }

    /// Every entry, most recently seen first.
    pub async fn list(&self) -> Result<Vec<SuppressionEntry>, SuppressionError> {
        let mut entries = self.store.list().await?;
        entries.sort_by(|a, b| {
            b.last_seen
                .cmp(&a.last_seen)
                .then_with(|| a.email.cmp(&b.email))
        });
        Ok(entries)
    }

    /// Suppress an address by hand. Defaults to `suppressed` with a generic reason.
    pub async fn add_manual(
        &self,
        email: &str,
        classification: Option<Classification>,
        reason: Option<String>,
    ) -> Result<SuppressionEntry, SuppressionError> {
        self.record_bounce(
            email,
            classification.unwrap_or(Classification::Suppressed),
            reason
                .filter(|reason| !reason.trim().is_empty())
                .unwrap_or_else(|| MANUAL_REASON.to_string()),
            None,
        )
        .await
    }

    /// Lift a suppression. The entry and its history are kept.
    pub async fn deactivate(
        &self,
        email: &str,
    ) -> Result<Option<SuppressionEntry>, SuppressionError> {
        let entry = self.store.deactivate(&address::normalize(email)).await?;
        if let Some(entry) = &entry {
            internal!(
                level = INFO,
                count = entry.count,
                "Suppression lifted"
            );
        }
        Ok(entry)
    }
}
