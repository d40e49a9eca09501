//! Checkpoint store configuration

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::lock::{LockStrategy, DEFAULT_POLL_INTERVAL};

/// Status file name inside the data directory
pub const STATUS_FILE_NAME: &str = "status.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Location of the YAML status document
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,

    #[serde(default)]
    pub lock_strategy: LockStrategy,

    /// Marker polling interval while another process holds the lock
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub lock_poll_interval: Duration,

    /// Delete any lock marker found when the store is opened
    #[serde(default = "default_true")]
    pub clear_stale_lock: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            status_file: default_status_file(),
            lock_strategy: LockStrategy::default(),
            lock_poll_interval: default_poll_interval(),
            clear_stale_lock: true,
        }
    }
}

impl StoreConfig {
    /// Configuration for a store at an explicit path, other settings default
    pub fn at(status_file: impl Into<PathBuf>) -> Self {
        Self {
            status_file: status_file.into(),
            ..Self::default()
        }
    }
}

/// `<platform data dir>/status.yaml`, or `.stagehand/status.yaml` if no home is known
pub fn default_status_file() -> PathBuf {
    ProjectDirs::from("", "", "stagehand")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".stagehand"))
        .join(STATUS_FILE_NAME)
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_true() -> bool {
    true
}
