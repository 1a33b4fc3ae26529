//! Storage seams
//!
//! Every durable entity sits behind one of these traits. Mutating operations
//! are targeted: callers describe a change to one record and the store applies
//! it atomically against the current value, so concurrent writers never
//! overwrite each other's fields.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_common::{
    event::EngagementEvent,
    ids::{ProviderMessageId, SendId, TenantId, WorkflowId},
    record::DeliveryRecord,
    suppression::{Classification, ContactStatus, SuppressionEntry},
    workflow::{WorkflowRecord, WorkflowState},
};

use crate::Result;

/// Result of a create-if-absent insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insert<T> {
    Inserted(T),
    Existing(T),
}

impl<T> Insert<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Inserted(value) | Self::Existing(value) => value,
        }
    }

    pub const fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Result of a compare-and-set workflow transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The guard held and the change was applied.
    Applied(WorkflowRecord),
    /// The guard rejected the current state; nothing changed.
    Rejected(WorkflowState),
    NotFound,
}

/// Result of appending a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    New,
    /// Already stored. `effects_applied` tells whether its suppression and
    /// statistics have been applied, `record_applied` whether the delivery
    /// record mutation has completed.
    Duplicate {
        effects_applied: bool,
        record_applied: bool,
    },
}

pub type StateGuard<'a> = &'a (dyn Fn(&WorkflowState) -> bool + Send + Sync);
pub type RecordUpdate<'a> = &'a (dyn Fn(&mut WorkflowRecord) + Send + Sync);

#[async_trait]
pub trait WorkflowStore: Send + Sync + Debug {
    async fn insert_if_absent(&self, record: WorkflowRecord) -> Result<Insert<WorkflowRecord>>;

    async fn get(&self, id: &WorkflowId) -> Result<Option<WorkflowRecord>>;

    /// Apply `update` if `guard` accepts the current state, atomically.
    async fn transition(
        &self,
        id: &WorkflowId,
        guard: StateGuard<'_>,
        update: RecordUpdate<'_>,
    ) -> Result<Transition>;

    /// Workflows whose run has not finished.
    async fn list_unfinished(&self) -> Result<Vec<WorkflowRecord>>;
}

#[async_trait]
pub trait DeliveryRecordStore: Send + Sync + Debug {
    async fn create_if_absent(&self, record: DeliveryRecord) -> Result<Insert<DeliveryRecord>>;

    async fn get(&self, send_id: &SendId) -> Result<Option<DeliveryRecord>>;

    async fn find_by_provider_message_id(
        &self,
        id: &ProviderMessageId,
    ) -> Result<Option<DeliveryRecord>>;

    /// Apply an engagement event to the record for `send_id`. Returns the
    /// updated record, or `None` if no record exists yet.
    async fn apply_event(
        &self,
        send_id: &SendId,
        event: &EngagementEvent,
    ) -> Result<Option<DeliveryRecord>>;
}

#[async_trait]
pub trait EventStore: Send + Sync + Debug {
    /// Append keyed by `(provider, event_id)`.
    async fn append(&self, event: &EngagementEvent) -> Result<Append>;

    async fn mark_effects_applied(&self, provider: &str, event_id: &str) -> Result<()>;

    async fn mark_record_applied(&self, provider: &str, event_id: &str) -> Result<()>;

    /// All events in append order.
    async fn list(&self) -> Result<Vec<EngagementEvent>>;
}

#[async_trait]
pub trait SuppressionStore: Send + Sync + Debug {
    /// Insert or fold a re-occurrence into the entry for `email`, atomically.
    async fn upsert(
        &self,
        email: &str,
        classification: Classification,
        reason: String,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
    ) -> Result<SuppressionEntry>;

    async fn get(&self, email: &str) -> Result<Option<SuppressionEntry>>;

    async fn list(&self) -> Result<Vec<SuppressionEntry>>;

    async fn deactivate(&self, email: &str) -> Result<Option<SuppressionEntry>>;
}

/// The external contact store, as seen by the suppression registry.
#[async_trait]
pub trait ContactDirectory: Send + Sync + Debug {
    /// Move contacts for `email` to `status`, but only those currently active.
    /// With no tenant, contacts in every tenant are considered. Returns how
    /// many contacts changed.
    async fn mark_if_active(
        &self,
        email: &str,
        tenant: Option<&TenantId>,
        status: ContactStatus,
    ) -> Result<usize>;
}
