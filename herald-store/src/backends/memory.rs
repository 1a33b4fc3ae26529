use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use herald_common::{
    address,
    event::EngagementEvent,
    ids::{ProviderMessageId, SendId, TenantId, WorkflowId},
    record::DeliveryRecord,
    suppression::{Classification, ContactStatus, SuppressionEntry},
    workflow::WorkflowRecord,
};
use serde::{Deserialize, Serialize};

use crate::{
    Result,
    traits::{
        Append, ContactDirectory, DeliveryRecordStore, EventStore, Insert, RecordUpdate,
        StateGuard, SuppressionStore, Transition, WorkflowStore,
    },
};

/// In-memory workflow store
///
/// Each transition runs under the `DashMap` shard lock for its key, which is
/// what makes compare-and-set safe against a concurrent cancel.
#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    pub(crate) records: DashMap<WorkflowId, WorkflowRecord>,
}

impl MemoryWorkflowStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn insert_if_absent(&self, record: WorkflowRecord) -> Result<Insert<WorkflowRecord>> {
        Ok(match self.records.entry(record.id.clone()) {
            Entry::Occupied(existing) => Insert::Existing(existing.get().clone()),
            Entry::Vacant(vacant) => {
                vacant.insert(record.clone());
                Insert::Inserted(record)
            }
        })
    }

    async fn get(&self, id: &WorkflowId) -> Result<Option<WorkflowRecord>> {
        Ok(self.records.get(id).map(|record| record.clone()))
    }

    async fn transition(
        &self,
        id: &WorkflowId,
        guard: StateGuard<'_>,
        update: RecordUpdate<'_>,
    ) -> Result<Transition> {
        let Some(mut record) = self.records.get_mut(id) else {
            return Ok(Transition::NotFound);
        };

        if !guard(&record.state) {
            return Ok(Transition::Rejected(record.state.clone()));
        }

        update(record.value_mut());
        Ok(Transition::Applied(record.clone()))
    }

    async fn list_unfinished(&self) -> Result<Vec<WorkflowRecord>> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .filter(|record| !record.state.is_finished())
            .map(|record| record.clone())
            .collect();
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }
}

/// In-memory delivery records, indexed by send id and provider message id
#[derive(Debug, Default)]
pub struct MemoryDeliveryRecordStore {
    pub(crate) records: DashMap<SendId, DeliveryRecord>,
    by_message_id: DashMap<ProviderMessageId, SendId>,
}

impl MemoryDeliveryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn restore(&self, record: DeliveryRecord) {
        self.by_message_id
            .insert(record.provider_message_id.clone(), record.send_id.clone());
        self.records.insert(record.send_id.clone(), record);
    }
}

#[async_trait]
impl DeliveryRecordStore for MemoryDeliveryRecordStore {
    async fn create_if_absent(&self, record: DeliveryRecord) -> Result<Insert<DeliveryRecord>> {
        Ok(match self.records.entry(record.send_id.clone()) {
            Entry::Occupied(existing) => Insert::Existing(existing.get().clone()),
            Entry::Vacant(vacant) => {
                self.by_message_id
                    .insert(record.provider_message_id.clone(), record.send_id.clone());
                vacant.insert(record.clone());
                Insert::Inserted(record)
            }
        })
    }

    async fn get(&self, send_id: &SendId) -> Result<Option<DeliveryRecord>> {
        Ok(self.records.get(send_id).map(|record| record.clone()))
    }

    async fn find_by_provider_message_id(
        &self,
        id: &ProviderMessageId,
    ) -> Result<Option<DeliveryRecord>> {
        let Some(send_id) = self.by_message_id.get(id).map(|send_id| send_id.clone()) else {
            return Ok(None);
        };

        Ok(self.records.get(&send_id).map(|record| record.clone()))
    }

    async fn apply_event(
        &self,
        send_id: &SendId,
        event: &EngagementEvent,
    ) -> Result<Option<DeliveryRecord>> {
        Ok(self.records.get_mut(send_id).map(|mut record| {
            record.apply(event);
            record.clone()
        }))
    }
}

/// An event as held by an event store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub sequence: u64,
    pub event: EngagementEvent,
    pub effects_applied: bool,
    pub record_applied: bool,
}

impl StoredEvent {
    pub(crate) fn duplicate(&self) -> Append {
        Append::Duplicate {
            effects_applied: self.effects_applied,
            record_applied: self.record_applied,
        }
    }
}

pub(crate) fn event_key(provider: &str, event_id: &str) -> String {
    format!("{provider}:{event_id}")
}

/// Append-only in-memory event log keyed by provider event id
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    pub(crate) events: DashMap<String, StoredEvent>,
    sequence: AtomicU64,
}

impl MemoryEventStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn restore(&self, stored: StoredEvent) {
        self.sequence
            .fetch_max(stored.sequence.saturating_add(1), Ordering::SeqCst);
        self.events.insert(
            event_key(&stored.event.provider, &stored.event.event_id),
            stored,
        );
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: &EngagementEvent) -> Result<Append> {
        Ok(
            match self.events.entry(event_key(&event.provider, &event.event_id)) {
                Entry::Occupied(existing) => existing.get().duplicate(),
                Entry::Vacant(vacant) => {
                    vacant.insert(StoredEvent {
                        sequence: self.next_sequence(),
                        event: event.clone(),
                        effects_applied: false,
                        record_applied: false,
                    });
                    Append::New
                }
            },
        )
    }

    async fn mark_effects_applied(&self, provider: &str, event_id: &str) -> Result<()> {
        if let Some(mut stored) = self.events.get_mut(&event_key(provider, event_id)) {
            stored.effects_applied = true;
        }
        Ok(())
    }

    async fn mark_record_applied(&self, provider: &str, event_id: &str) -> Result<()> {
        if let Some(mut stored) = self.events.get_mut(&event_key(provider, event_id)) {
            stored.record_applied = true;
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<EngagementEvent>> {
        let mut stored: Vec<_> = self.events.iter().map(|e| e.clone()).collect();
        stored.sort_by_key(|stored| stored.sequence);
        Ok(stored.into_iter().map(|stored| stored.event).collect())
    }
}

/// In-memory suppression list keyed by lower-cased address
#[derive(Debug, Default)]
pub struct MemorySuppressionStore {
    pub(crate) entries: DashMap<String, SuppressionEntry>,
}

impl MemorySuppressionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SuppressionStore for MemorySuppressionStore {
    async fn upsert(
        &self,
        email: &str,
        classification: Classification,
        reason: String,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
    ) -> Result<SuppressionEntry> {
        let key = address::normalize(email);

        Ok(match self.entries.entry(key.clone()) {
            Entry::Occupied(mut existing) => {
                let entry = existing.get_mut();
                entry.record_occurrence(classification, reason, now);
                entry.clone()
            }
            Entry::Vacant(vacant) => vacant
                .insert(SuppressionEntry::new(
                    key,
                    classification,
                    reason,
                    tenant_id,
                    now,
                ))
                .clone(),
        })
    }

    async fn get(&self, email: &str) -> Result<Option<SuppressionEntry>> {
        Ok(self
            .entries
            .get(&address::normalize(email))
            .map(|entry| entry.clone()))
    }

    async fn list(&self) -> Result<Vec<SuppressionEntry>> {
        let mut entries: Vec<_> = self.entries.iter().map(|e| e.clone()).collect();
        entries.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(entries)
    }

    async fn deactivate(&self, email: &str) -> Result<Option<SuppressionEntry>> {
        Ok(self
            .entries
            .get_mut(&address::normalize(email))
            .map(|mut entry| {
                entry.active = false;
                entry.clone()
            }))
    }
}

/// Contact directory held in memory, keyed by tenant and lower-cased address
#[derive(Debug, Default)]
pub struct MemoryContactDirectory {
    contacts: DashMap<(TenantId, String), ContactStatus>,
}

impl MemoryContactDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant: TenantId, email: &str, status: ContactStatus) {
        self.contacts
            .insert((tenant, address::normalize(email)), status);
    }

    #[must_use]
    pub fn status(&self, tenant: &TenantId, email: &str) -> Option<ContactStatus> {
        self.contacts
            .get(&(tenant.clone(), address::normalize(email)))
            .map(|status| *status)
    }
}

#[async_trait]
impl ContactDirectory for MemoryContactDirectory {
    async fn mark_if_active(
        &self,
        email: &str,
        tenant: Option<&TenantId>,
        status: ContactStatus,
    ) -> Result<usize> {
        let email = address::normalize(email);
        let mut changed = 0;

        for mut contact in self.contacts.iter_mut() {
            let (contact_tenant, contact_email) = contact.key();
            if *contact_email != email || tenant.is_some_and(|tenant| tenant != contact_tenant) {
                continue;
            }

            if *contact.value() == ContactStatus::Active {
                *contact.value_mut() = status;
                changed += 1;
            }
        }

        Ok(changed)
    }
}
