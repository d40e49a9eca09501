//! Cross-process mutual exclusion around status document access

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::error::{StorageError, StorageResult};

/// Default polling interval while another holder owns the marker
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lock marker location for a status document: `<path>.lock`
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

/// Held lock; releasing happens on `release` or on drop
#[async_trait]
pub trait StoreLockGuard: Send + Sync {
    fn lock_file(&self) -> &Path;

    /// Explicitly release the lock
    async fn release(self: Box<Self>) -> StorageResult<()>;
}

/// Strategy for serializing access to one status document across processes
#[async_trait]
pub trait StoreLock: Send + Sync {
    /// Wait until the lock for `path` is held. No timeout.
    async fn acquire(&self, path: &Path) -> StorageResult<Box<dyn StoreLockGuard>>;

    /// Remove leftovers of a holder that died without releasing
    async fn clear_stale(&self, path: &Path) -> StorageResult<()>;
}

/// Which lock strategy a store uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStrategy {
    /// Exclusive-create marker file, polled until free
    #[default]
    Marker,
    /// Advisory `flock` on the marker file; released by the OS if the holder dies
    Flock,
}

impl LockStrategy {
    pub fn build(self, poll_interval: Duration) -> Arc<dyn StoreLock> {
        match self {
            LockStrategy::Marker => Arc::new(MarkerFileLock::new(poll_interval)),
            LockStrategy::Flock => Arc::new(FlockLock),
        }
    }
}

impl fmt::Display for LockStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockStrategy::Marker => f.write_str("marker"),
            LockStrategy::Flock => f.write_str("flock"),
        }
    }
}

impl FromStr for LockStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "marker" => Ok(LockStrategy::Marker),
            "flock" => Ok(LockStrategy::Flock),
            other => Err(format!(
                "unknown lock strategy '{}', expected marker or flock",
                other
            )),
        }
    }
}

/// Marker-file lock.
///
/// The lock is held while `<path>.lock` exists. Acquisition creates it with
/// exclusive-create semantics and polls at a fixed interval while it is taken.
/// A marker left behind by a crashed holder blocks every waiter until it is
/// cleared, which `clear_stale` does unconditionally.
pub struct MarkerFileLock {
    poll_interval: Duration,
}

impl MarkerFileLock {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for MarkerFileLock {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

#[async_trait]
impl StoreLock for MarkerFileLock {
    async fn acquire(&self, path: &Path) -> StorageResult<Box<dyn StoreLockGuard>> {
        let marker = lock_path(path);
        let mut waited = 0u64;

        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&marker)
                .await
            {
                Ok(_) => {
                    debug!("Acquired lock {} after {} poll(s)", marker.display(), waited);
                    return Ok(Box::new(MarkerLockGuard::new(marker)));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    waited += 1;
                    trace!("Lock {} is held, waiting", marker.display());
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => return Err(StorageError::io(&marker, e)),
            }
        }
    }

    async fn clear_stale(&self, path: &Path) -> StorageResult<()> {
        let marker = lock_path(path);
        match tokio::fs::remove_file(&marker).await {
            Ok(()) => {
                warn!("Removed stale lock {}", marker.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&marker, e)),
        }
    }
}

/// Guard that deletes the marker file when released or dropped
pub struct MarkerLockGuard {
    lock_file: PathBuf,
    armed: bool,
}

impl MarkerLockGuard {
    fn new(lock_file: PathBuf) -> Self {
        Self {
            lock_file,
            armed: true,
        }
    }
}

#[async_trait]
impl StoreLockGuard for MarkerLockGuard {
    fn lock_file(&self) -> &Path {
        &self.lock_file
    }

    async fn release(mut self: Box<Self>) -> StorageResult<()> {
        self.armed = false;
        tokio::fs::remove_file(&self.lock_file)
            .await
            .map_err(|e| StorageError::lock(format!("Failed to release lock: {}", e)))?;
        debug!("Released lock {}", self.lock_file.display());
        Ok(())
    }
}

impl Drop for MarkerLockGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.lock_file);
        }
    }
}

/// Advisory `flock` lock on `<path>.lock`.
///
/// The marker file persists between holders; only the kernel lock matters, so
/// there is never a stale lock to clear.
pub struct FlockLock;

#[async_trait]
impl StoreLock for FlockLock {
    async fn acquire(&self, path: &Path) -> StorageResult<Box<dyn StoreLockGuard>> {
        let marker = lock_path(path);
        let target = marker.clone();
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<std::fs::File> {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&target)?;
            fs2::FileExt::lock_exclusive(&file)?;
            Ok(file)
        })
        .await
        .map_err(|e| StorageError::lock(format!("Lock task failed: {}", e)))?
        .map_err(|e| StorageError::io(&marker, e))?;

        debug!("Acquired flock {}", marker.display());
        Ok(Box::new(FlockGuard {
            lock_file: marker,
            file,
        }))
    }

    async fn clear_stale(&self, _path: &Path) -> StorageResult<()> {
        Ok(())
    }
}

pub struct FlockGuard {
    lock_file: PathBuf,
    file: std::fs::File,
}

#[async_trait]
impl StoreLockGuard for FlockGuard {
    fn lock_file(&self) -> &Path {
        &self.lock_file
    }

    async fn release(self: Box<Self>) -> StorageResult<()> {
        fs2::FileExt::unlock(&self.file)
            .map_err(|e| StorageError::lock(format!("Failed to release lock: {}", e)))?;
        debug!("Released flock {}", self.lock_file.display());
        Ok(())
    }
}
