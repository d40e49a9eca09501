use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod loader;

pub use loader::ConfigLoader;

use crate::error::{ErrorCode, Result, StagehandError};
use crate::retry::RetryPolicy;
use crate::storage::{LockStrategy, StoreConfig};

/// Project-local configuration file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "stagehand.toml";

pub const ENV_STATUS_FILE: &str = "STAGEHAND_STATUS_FILE";
pub const ENV_LOCK_STRATEGY: &str = "STAGEHAND_LOCK_STRATEGY";
pub const ENV_MAX_ATTEMPTS: &str = "STAGEHAND_MAX_ATTEMPTS";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagehandConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl StagehandConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge_env_vars(&mut self) -> Result<()> {
        self.merge_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any variable source
    pub fn merge_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_STATUS_FILE) {
            self.store.status_file = PathBuf::from(path);
        }

        if let Some(strategy) = lookup(ENV_LOCK_STRATEGY) {
            self.store.lock_strategy = strategy
                .parse::<LockStrategy>()
                .map_err(|e| invalid_value(ENV_LOCK_STRATEGY, e))?;
        }

        if let Some(attempts) = lookup(ENV_MAX_ATTEMPTS) {
            let attempts = attempts
                .trim()
                .parse::<u32>()
                .map_err(|e| invalid_value(ENV_MAX_ATTEMPTS, e))?;
            if attempts == 0 {
                return Err(invalid_value(ENV_MAX_ATTEMPTS, "must be at least 1"));
            }
            self.retry.max_attempts = attempts;
        }

        Ok(())
    }
}

fn invalid_value(variable: &str, reason: impl std::fmt::Display) -> StagehandError {
    StagehandError::config_with_code(
        ErrorCode::CONFIG_INVALID_VALUE,
        format!("Invalid value for {}: {}", variable, reason),
    )
}
