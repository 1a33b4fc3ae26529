pub mod backends;
pub mod config;
pub mod error;
pub mod traits;

pub use backends::{
    FileDeliveryRecordStore, FileEventStore, FileSuppressionStore, FileWorkflowStore,
    MemoryContactDirectory, MemoryDeliveryRecordStore, MemoryEventStore, MemorySuppressionStore,
    MemoryWorkflowStore,
};
pub use config::{StorageConfig, Stores};
pub use error::{Result, SerializationError, StoreError};
pub use traits::{
    Append, ContactDirectory, DeliveryRecordStore, EventStore, Insert, SuppressionStore,
    Transition, WorkflowStore,
};
