//! Write-through file backend
//!
//! Every record lives in its own file named after the hex encoded key:
//! `{root}/{table}/{hex(key)}.bin`, holding the bincode encoded value. Reads are
//! served from the in-memory store that is loaded at open. Workflow and
//! delivery mutations are applied in memory first and then written out.
//! Events and suppressions are written first and only then committed to
//! memory, so a failed write leaves both unchanged.
//!
//! Writes go to `.tmp_{name}` first and are renamed into place, so a crash
//! mid-write never leaves a truncated record behind.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_common::{
    address,
    event::EngagementEvent,
    ids::{ProviderMessageId, SendId, TenantId, WorkflowId},
    internal,
    record::DeliveryRecord,
    suppression::{Classification, SuppressionEntry},
    workflow::WorkflowRecord,
};
use serde::{Serialize, de::DeserializeOwned};
use tokio::{fs, sync::Mutex};

use super::memory::{
    MemoryDeliveryRecordStore, MemoryEventStore, MemorySuppressionStore, MemoryWorkflowStore,
    StoredEvent, event_key,
};
use crate::{
    Result, SerializationError, StoreError,
    traits::{
        Append, DeliveryRecordStore, EventStore, Insert, RecordUpdate, StateGuard,
        SuppressionStore, Transition, WorkflowStore,
    },
};

const EXTENSION: &str = "bin";
const TEMP_PREFIX: &str = ".tmp_";

/// One directory of records
#[derive(Debug)]
pub(crate) struct RecordFiles {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl RecordFiles {
    pub(crate) async fn open(root: &Path, table: &str) -> Result<Self> {
        let dir = root.join(table);
        fs::create_dir_all(&dir).await?;

        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", hex::encode(key)))
    }

    /// Load every record in the directory, skipping partial writes.
    pub(crate) async fn load<V: DeserializeOwned>(&self) -> Result<Vec<(String, V)>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut records = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();

            if file_name.starts_with(TEMP_PREFIX) {
                continue;
            }

            let Some(stem) = file_name.strip_suffix(&format!(".{EXTENSION}")) else {
                continue;
            };

            let key = hex::decode(stem)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .ok_or_else(|| SerializationError::InvalidFileName(file_name.to_string()))?;

            let bytes = fs::read(entry.path()).await?;
            let (value, _) =
                bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                    .map_err(SerializationError::from)?;

            records.push((key, value));
        }

        internal!(
            level = DEBUG,
            "Loaded {} records from {}",
            records.len(),
            self.dir.display()
        );

        Ok(records)
    }

    /// Write out the value `current` returns at the time the write lock is
    /// held, so the last write for a key always carries the latest state.
    pub(crate) async fn save<V, F>(&self, key: &str, current: F) -> Result<()>
    where
        V: Serialize,
        F: FnOnce() -> Option<V> + Send,
    {
        let _guard = self.write_lock.lock().await;

        match current() {
            Some(value) => self.write_unlocked(key, &value).await,
            None => Ok(()),
        }
    }

    /// Write `value` for `key`.
    pub(crate) async fn write<V: Serialize>(&self, key: &str, value: &V) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_unlocked(key, value).await
    }

    async fn write_unlocked<V: Serialize>(&self, key: &str, value: &V) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(SerializationError::from)?;

        let path = self.path_for(key);
        let temp = self
            .dir
            .join(format!("{TEMP_PREFIX}{}.{EXTENSION}", hex::encode(key)));

        fs::write(&temp, &bytes).await?;
        fs::rename(&temp, &path).await?;

        Ok(())
    }
}

/// Reject storage roots that try to climb out of their parent.
pub(crate) fn validate_root(path: &Path) -> Result<()> {
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(StoreError::InvalidPath {
            path: path.display().to_string(),
            reason: "Path cannot contain '..' components".to_string(),
        });
    }

    if path.as_os_str().is_empty() {
        return Err(StoreError::InvalidPath {
            path: String::new(),
            reason: "Path is empty".to_string(),
        });
    }

    Ok(())
}

#[derive(Debug)]
pub struct FileWorkflowStore {
    inner: MemoryWorkflowStore,
    files: RecordFiles,
}

impl FileWorkflowStore {
    pub async fn open(root: &Path) -> Result<Self> {
        validate_root(root)?;
        let files = RecordFiles::open(root, "workflows").await?;
        let inner = MemoryWorkflowStore::new();

        for (_, record) in files.load::<WorkflowRecord>().await? {
            inner.records.insert(record.id.clone(), record);
        }

        Ok(Self { inner, files })
    }

    async fn persist(&self, id: &WorkflowId) -> Result<()> {
        self.files
            .save(id.as_str(), || {
                self.inner.records.get(id).map(|record| record.clone())
            })
            .await
    }
}

#[async_trait]
impl WorkflowStore for FileWorkflowStore {
    async fn insert_if_absent(&self, record: WorkflowRecord) -> Result<Insert<WorkflowRecord>> {
        let id = record.id.clone();
        let outcome = self.inner.insert_if_absent(record).await?;

        if outcome.is_inserted() {
            self.persist(&id).await?;
        }

        Ok(outcome)
    }

    async fn get(&self, id: &WorkflowId) -> Result<Option<WorkflowRecord>> {
        self.inner.get(id).await
    }

    async fn transition(
        &self,
        id: &WorkflowId,
        guard: StateGuard<'_>,
        update: RecordUpdate<'_>,
    ) -> Result<Transition> {
        let outcome = self.inner.transition(id, guard, update).await?;

        if matches!(outcome, Transition::Applied(_)) {
            self.persist(id).await?;
        }

        Ok(outcome)
    }

    async fn list_unfinished(&self) -> Result<Vec<WorkflowRecord>> {
        self.inner.list_unfinished().await
    }
}

#[derive(Debug)]
pub struct FileDeliveryRecordStore {
    inner: MemoryDeliveryRecordStore,
    files: RecordFiles,
}

impl FileDeliveryRecordStore {
    pub async fn open(root: &Path) -> Result<Self> {
        validate_root(root)?;
        let files = RecordFiles::open(root, "deliveries").await?;
        let inner = MemoryDeliveryRecordStore::new();

        for (_, record) in files.load::<DeliveryRecord>().await? {
            inner.restore(record);
        }

        Ok(Self { inner, files })
    }

    async fn persist(&self, send_id: &SendId) -> Result<()> {
        self.files
            .save(send_id.as_str(), || {
                self.inner.records.get(send_id).map(|record| record.clone())
            })
            .await
    }
}

#[async_trait]
impl DeliveryRecordStore for FileDeliveryRecordStore {
    async fn create_if_absent(&self, record: DeliveryRecord) -> Result<Insert<DeliveryRecord>> {
        let send_id = record.send_id.clone();
        let outcome = self.inner.create_if_absent(record).await?;

        if outcome.is_inserted() {
            self.persist(&send_id).await?;
        }

        Ok(outcome)
    }

    async fn get(&self, send_id: &SendId) -> Result<Option<DeliveryRecord>> {
        self.inner.get(send_id).await
    }

    async fn find_by_provider_message_id(
        &self,
        id: &ProviderMessageId,
    ) -> Result<Option<DeliveryRecord>> {
        self.inner.find_by_provider_message_id(id).await
    }

    async fn apply_event(
        &self,
        send_id: &SendId,
        event: &EngagementEvent,
    ) -> Result<Option<DeliveryRecord>> {
        let updated = self.inner.apply_event(send_id, event).await?;

        if updated.is_some() {
            self.persist(send_id).await?;
        }

        Ok(updated)
    }
}

#[derive(Debug)]
pub struct FileEventStore {
    inner: MemoryEventStore,
    files: RecordFiles,
    /// Serializes write-then-commit mutations.
    mutation: Mutex<()>,
}

impl FileEventStore {
    pub async fn open(root: &Path) -> Result<Self> {
        validate_root(root)?;
        let files = RecordFiles::open(root, "events").await?;
        let inner = MemoryEventStore::new();

        for (_, stored) in files.load::<StoredEvent>().await? {
            inner.restore(stored);
        }

        Ok(Self {
            inner,
            files,
            mutation: Mutex::new(()),
        })
    }

    async fn mark(
        &self,
        provider: &str,
        event_id: &str,
        update: fn(&mut StoredEvent),
    ) -> Result<()> {
        let _guard = self.mutation.lock().await;
        let key = event_key(provider, event_id);

        let Some(mut stored) = self.inner.events.get(&key).map(|stored| stored.clone()) else {
            return Ok(());
        };
        update(&mut stored);

        self.files.write(&key, &stored).await?;
        self.inner.events.insert(key, stored);
        Ok(())
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    async fn append(&self, event: &EngagementEvent) -> Result<Append> {
        let _guard = self.mutation.lock().await;
        let key = event_key(&event.provider, &event.event_id);

        if let Some(existing) = self.inner.events.get(&key) {
            return Ok(existing.duplicate());
        }

        let stored = StoredEvent {
            sequence: self.inner.next_sequence(),
            event: event.clone(),
            effects_applied: false,
            record_applied: false,
        };
        self.files.write(&key, &stored).await?;
        self.inner.restore(stored);

        Ok(Append::New)
    }

    async fn mark_effects_applied(&self, provider: &str, event_id: &str) -> Result<()> {
        self.mark(provider, event_id, |stored| stored.effects_applied = true)
            .await
    }

    async fn mark_record_applied(&self, provider: &str, event_id: &str) -> Result<()> {
        self.mark(provider, event_id, |stored| stored.record_applied = true)
            .await
    }

    async fn list(&self) -> Result<Vec<EngagementEvent>> {
        self.inner.list().await
    }
}

#[derive(Debug)]
pub struct FileSuppressionStore {
    inner: MemorySuppressionStore,
    files: RecordFiles,
    /// Serializes write-then-commit mutations.
    mutation: Mutex<()>,
}

impl FileSuppressionStore {
    pub async fn open(root: &Path) -> Result<Self> {
        validate_root(root)?;
        let files = RecordFiles::open(root, "suppressions").await?;
        let inner = MemorySuppressionStore::new();

        for (key, entry) in files.load::<SuppressionEntry>().await? {
            inner.entries.insert(key, entry);
        }

        Ok(Self {
            inner,
            files,
            mutation: Mutex::new(()),
        })
    }

    async fn commit(&self, entry: SuppressionEntry) -> Result<SuppressionEntry> {
        self.files.write(&entry.email, &entry).await?;
        self.inner.entries.insert(entry.email.clone(), entry.clone());
        Ok(entry)
    }
}

#[async_trait]
impl SuppressionStore for FileSuppressionStore {
    async fn upsert(
        &self,
        email: &str,
        classification: Classification,
        reason: String,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
    ) -> Result<SuppressionEntry> {
        let _guard = self.mutation.lock().await;
        let key = address::normalize(email);

        let entry = match self.inner.entries.get(&key).map(|entry| entry.clone()) {
            Some(mut entry) => {
                entry.record_occurrence(classification, reason, now);
                entry
            }
            None => SuppressionEntry::new(key, classification, reason, tenant_id, now),
        };

        self.commit(entry).await
    }

    async fn get(&self, email: &str) -> Result<Option<SuppressionEntry>> {
        self.inner.get(email).await
    }

    async fn list(&self) -> Result<Vec<SuppressionEntry>> {
        self.inner.list().await
    }

    async fn deactivate(&self, email: &str) -> Result<Option<SuppressionEntry>> {
        let _guard = self.mutation.lock().await;

        let Some(mut entry) = self.inner.get(email).await? else {
            return Ok(None);
        };
        entry.active = false;

        self.commit(entry).await.map(Some)
    }
}
