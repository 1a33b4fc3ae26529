use std::{path::PathBuf, sync::Arc};

use herald_common::internal;
use serde::Deserialize;

use crate::{
    Result,
    backends::{
        FileDeliveryRecordStore, FileEventStore, FileSuppressionStore, FileWorkflowStore,
        MemoryDeliveryRecordStore, MemoryEventStore, MemorySuppressionStore, MemoryWorkflowStore,
    },
    traits::{DeliveryRecordStore, EventStore, SuppressionStore, WorkflowStore},
};

/// Storage backend selection
///
/// File storage in RON config:
/// ```ron
/// Herald (
///     storage: File(
///         path: "/var/lib/herald",
///     ),
/// )
/// ```
///
/// Memory storage for development, lost on restart:
/// ```ron
/// Herald (
///     storage: Memory,
/// )
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub enum StorageConfig {
    #[default]
    Memory,
    File { path: PathBuf },
}

/// The set of stores the rest of the system runs against.
#[derive(Debug, Clone)]
pub struct Stores {
    pub workflows: Arc<dyn WorkflowStore>,
    pub deliveries: Arc<dyn DeliveryRecordStore>,
    pub events: Arc<dyn EventStore>,
    pub suppressions: Arc<dyn SuppressionStore>,
}

impl Stores {
    #[must_use]
    pub fn memory() -> Self {
        Self {
            workflows: Arc::new(MemoryWorkflowStore::new()),
            deliveries: Arc::new(MemoryDeliveryRecordStore::new()),
            events: Arc::new(MemoryEventStore::new()),
            suppressions: Arc::new(MemorySuppressionStore::new()),
        }
    }

    /// Open (or create) file storage rooted at `path`, loading existing records.
    pub async fn file(path: &std::path::Path) -> Result<Self> {
        Ok(Self {
            workflows: Arc::new(FileWorkflowStore::open(path).await?),
            deliveries: Arc::new(FileDeliveryRecordStore::open(path).await?),
            events: Arc::new(FileEventStore::open(path).await?),
            suppressions: Arc::new(FileSuppressionStore::open(path).await?),
        })
    }
}

impl StorageConfig {
    pub async fn open(&self) -> Result<Stores> {
        match self {
            Self::Memory => {
                internal!(level = INFO, "Using in-memory storage");
                Ok(Stores::memory())
            }
            Self::File { path } => {
                internal!(level = INFO, "Using file storage at {}", path.display());
                Stores::file(path).await
            }
        }
    }
}
