//! The checkpoint store: locked read-modify-write over one YAML document

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::codec::{read_document, write_document};
use super::config::StoreConfig;
use super::error::{StorageError, StorageResult};
use super::lock::{LockStrategy, StoreLock, DEFAULT_POLL_INTERVAL};
use super::types::{FieldValue, Identity, Level, StatusDocument};

/// Handle to a status document shared by every process pointed at the same path.
///
/// The handle holds no document state: every operation takes the lock, reloads
/// the file, and releases the lock before returning. Two calls are never atomic
/// as a pair.
#[derive(Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    lock: Arc<dyn StoreLock>,
}

impl std::fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl CheckpointStore {
    /// Open the store described by `config`.
    ///
    /// Creates the parent directory and, when `clear_stale_lock` is set,
    /// removes a lock left behind by a crashed holder.
    pub async fn open(config: &StoreConfig) -> StorageResult<Self> {
        let lock = config.lock_strategy.build(config.lock_poll_interval);
        let store = Self::with_lock(&config.status_file, lock);

        if let Some(parent) = store.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }

        if config.clear_stale_lock {
            store.lock.clear_stale(&store.path).await?;
        }

        info!(
            "Opened status file {} ({} lock)",
            store.path.display(),
            config.lock_strategy
        );
        Ok(store)
    }

    /// Open with default settings at an explicit path
    pub async fn open_at(path: impl Into<PathBuf>) -> StorageResult<Self> {
        Self::open(&StoreConfig::at(path)).await
    }

    /// Build a handle around an existing lock without touching the filesystem
    pub fn with_lock(path: impl Into<PathBuf>, lock: Arc<dyn StoreLock>) -> Self {
        Self {
            path: path.into(),
            lock,
        }
    }

    /// Handle using the default marker lock, without clearing stale locks
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_lock(path, LockStrategy::Marker.build(DEFAULT_POLL_INTERVAL))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read one field. Missing ancestors or keys yield `None`.
    pub async fn get(
        &self,
        identity: &Identity,
        level: Level,
        key: &str,
    ) -> StorageResult<Option<FieldValue>> {
        let document = self.locked(read_document(&self.path)).await?;
        let value = document.field(identity, level, key).cloned();
        debug!(
            "get {} [{}] {} -> {}",
            identity,
            level,
            key,
            if value.is_some() { "present" } else { "absent" }
        );
        Ok(value)
    }

    /// Write one field, preserving everything else in the freshly loaded document
    pub async fn set(
        &self,
        identity: &Identity,
        level: Level,
        key: &str,
        value: impl Into<FieldValue>,
    ) -> StorageResult<()> {
        level.validate_key(key)?;
        let value = value.into();
        self.locked(async {
            let mut document = read_document(&self.path).await?;
            document.set_field(identity, level, key, value)?;
            write_document(&self.path, &document).await
        })
        .await?;
        debug!("set {} [{}] {}", identity, level, key);
        Ok(())
    }

    /// Create the record at `level` and any missing ancestors, writing no field
    pub async fn touch(&self, identity: &Identity, level: Level) -> StorageResult<()> {
        self.locked(async {
            let mut document = read_document(&self.path).await?;
            let before = document.clone();
            document.touch(identity, level)?;
            if document != before {
                write_document(&self.path, &document).await?;
            }
            Ok(())
        })
        .await
    }

    /// Load the whole document
    pub async fn snapshot(&self) -> StorageResult<StatusDocument> {
        self.locked(read_document(&self.path)).await
    }

    /// Delete the backing file. Returns whether a file was removed.
    pub async fn reset(&self) -> StorageResult<bool> {
        let removed = self
            .locked(async {
                match tokio::fs::remove_file(&self.path).await {
                    Ok(()) => Ok(true),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                    Err(e) => Err(StorageError::io(&self.path, e)),
                }
            })
            .await?;
        if removed {
            info!("Reset status file {}", self.path.display());
        }
        Ok(removed)
    }

    /// Run `operation` while holding the lock; the lock is released whatever it returns
    async fn locked<T, F>(&self, operation: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        let guard = self.lock.acquire(&self.path).await?;
        let result = operation.await;
        let released = guard.release().await;
        let value = result?;
        released?;
        Ok(value)
    }
}
