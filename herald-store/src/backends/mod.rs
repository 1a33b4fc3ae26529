//! Backing store implementations
//!
//! - `memory`: `DashMap` backed stores, also the read cache of the file stores
//! - `file`: write-through file storage for records that must survive a restart

pub mod file;
pub mod memory;

pub use file::{FileDeliveryRecordStore, FileEventStore, FileSuppressionStore, FileWorkflowStore};
pub use memory::{
    MemoryContactDirectory, MemoryDeliveryRecordStore, MemoryEventStore, MemorySuppressionStore,
    MemoryWorkflowStore, StoredEvent,
};
