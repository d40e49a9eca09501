use super::{ErrorCode, StagehandError};
use std::path::Path;

/// Extension trait for convenient error conversion
pub trait ErrorExt<T> {
    /// Convert to StagehandError with context
    fn to_stagehand(self, context: impl Into<String>) -> Result<T, StagehandError>;

    fn to_config_error(self, message: impl Into<String>) -> Result<T, StagehandError>;
    fn to_storage_error(self, message: impl Into<String>) -> Result<T, StagehandError>;
}

impl<T, E> ErrorExt<T> for Result<T, E>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn to_stagehand(self, context: impl Into<String>) -> Result<T, StagehandError> {
        self.map_err(|e| StagehandError::other(context).with_source(e))
    }

    fn to_config_error(self, message: impl Into<String>) -> Result<T, StagehandError> {
        self.map_err(|e| StagehandError::config(message).with_source(e))
    }

    fn to_storage_error(self, message: impl Into<String>) -> Result<T, StagehandError> {
        self.map_err(|e| StagehandError::storage(message).with_source(e))
    }
}

/// Create a not found error for configuration
pub fn config_not_found(path: impl AsRef<Path>) -> StagehandError {
    StagehandError::config_with_code(
        ErrorCode::CONFIG_NOT_FOUND,
        format!("Configuration file not found: {}", path.as_ref().display()),
    )
}
