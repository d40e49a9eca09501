use super::{StagehandConfig, CONFIG_FILE_NAME};
use crate::error::helpers::config_not_found;
use crate::error::{ErrorExt, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Loads configuration in layers: defaults, a TOML file, then environment overrides
pub struct ConfigLoader {
    explicit_path: Option<PathBuf>,
    search_dir: PathBuf,
}

impl ConfigLoader {
    /// Look for `stagehand.toml` in the current directory
    pub fn new() -> Self {
        Self {
            explicit_path: None,
            search_dir: PathBuf::from("."),
        }
    }

    /// Use `path`, which must exist
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_path = Some(path.into());
        self
    }

    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = dir.into();
        self
    }

    pub async fn load(&self) -> Result<StagehandConfig> {
        let mut config = match &self.explicit_path {
            Some(path) => {
                if !fs::try_exists(path).await.unwrap_or(false) {
                    return Err(config_not_found(path));
                }
                Self::read_file(path).await?
            }
            None => {
                let candidate = self.search_dir.join(CONFIG_FILE_NAME);
                if fs::try_exists(&candidate).await.unwrap_or(false) {
                    Self::read_file(&candidate).await?
                } else {
                    debug!("No {} found, using defaults", candidate.display());
                    StagehandConfig::default()
                }
            }
        };

        config.merge_env_vars()?;
        Ok(config)
    }

    async fn read_file(path: &Path) -> Result<StagehandConfig> {
        debug!("Loading configuration from {}", path.display());
        let content = fs::read_to_string(path)
            .await
            .to_config_error(format!("Failed to read {}", path.display()))?;
        let config: StagehandConfig = toml::from_str(&content)
            .map_err(|e| crate::error::StagehandError::from(e).with_context(path.display()))?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_project_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ConfigLoader::new()
            .with_search_dir(temp.path())
            .load()
            .await
            .unwrap();
        assert_eq!(config.retry.max_polls, 60);
    }

    #[tokio::test]
    async fn test_project_file_is_loaded() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "[retry]\nmax_polls = 12\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_search_dir(temp.path())
            .load()
            .await
            .unwrap();
        assert_eq!(config.retry.max_polls, 12);
    }

    #[tokio::test]
    async fn test_explicit_missing_file_is_error() {
        let temp = TempDir::new().unwrap();
        let err = ConfigLoader::new()
            .with_file(temp.path().join("absent.toml"))
            .load()
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_toml_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.toml");
        std::fs::write(&path, "[retry\nmax_polls = ").unwrap();

        let err = ConfigLoader::new()
            .with_file(&path)
            .load()
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_INVALID_TOML);
        assert_eq!(err.exit_code(), 2);
    }
}
