//! Checkpoint store for stagehand
//!
//! A hierarchical status record (hub, sub-environment, sub-resource) kept in
//! one hand-editable YAML document. Every process pointed at the same path
//! coordinates through an advisory lock next to the document.

pub mod codec;
pub mod config;
pub mod error;
pub mod lock;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

pub use config::StoreConfig;
pub use error::{StorageError, StorageResult};
pub use lock::{lock_path, FlockLock, LockStrategy, MarkerFileLock, StoreLock, StoreLockGuard};
pub use store::CheckpointStore;
pub use types::{
    fields, FieldValue, HubStatus, Identity, Level, StatusDocument, SubEnvStatus,
    SubResourceStatus, UserInfo,
};
