use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

pub mod codes;
pub mod helpers;
pub mod serialization;

pub use codes::{describe_error_code, ErrorCode};
pub use helpers::ErrorExt;
pub use serialization::ErrorRecord;

/// The unified error type for the checkpoint store, stage protocol and retry driver
#[derive(Error, Debug)]
pub enum StagehandError {
    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Filesystem failure reading or writing the status document or its lock marker
    #[error("[E{code:04}] Storage error: {message}")]
    Storage {
        code: u16,
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Retry-eligible external failure
    #[error("[E{code:04}] Transient external error: {message}")]
    Transient {
        code: u16,
        message: String,
        name: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Stale or missing credentials for the external system
    #[error("[E{code:04}] Credential error: {message}")]
    Credential {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The desired end state already holds
    #[error("[E{code:04}] Already exists: {message}")]
    Conflict {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Permanent failure after {attempts} attempt(s): {message}")]
    Permanent {
        code: u16,
        message: String,
        name: Option<String>,
        attempts: u32,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] {message}")]
    Other {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StagehandError {
    /// Create a configuration error with default code
    pub fn config(message: impl Into<String>) -> Self {
        Self::config_with_code(ErrorCode::CONFIG_GENERIC, message)
    }

    /// Create a configuration error with specific code
    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage error with default code
    pub fn storage(message: impl Into<String>) -> Self {
        Self::storage_with_code(ErrorCode::STORAGE_GENERIC, message, None)
    }

    /// Create a storage error with specific code and path
    pub fn storage_with_code(code: u16, message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Storage {
            code,
            message: message.into(),
            path,
            source: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::transient_with_code(ErrorCode::EXEC_TRANSIENT, message)
    }

    pub fn transient_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Transient {
            code,
            message: message.into(),
            name: None,
            source: None,
        }
    }

    pub fn credential(message: impl Into<String>) -> Self {
        Self::credential_with_code(ErrorCode::EXEC_STALE_CREDENTIAL, message)
    }

    pub fn credential_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Credential {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            code: ErrorCode::EXEC_ALREADY_EXISTS,
            message: message.into(),
            source: None,
        }
    }

    /// Create a permanent failure with default code
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::permanent_with_code(ErrorCode::STAGE_FAILED, message)
    }

    /// Create a permanent failure with specific code
    pub fn permanent_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Permanent {
            code,
            message: message.into(),
            name: None,
            attempts: 1,
            source: None,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            code: ErrorCode::OTHER_GENERIC,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error to this error
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        match &mut self {
            Self::Config { source: src, .. }
            | Self::Storage { source: src, .. }
            | Self::Transient { source: src, .. }
            | Self::Credential { source: src, .. }
            | Self::Conflict { source: src, .. }
            | Self::Permanent { source: src, .. }
            | Self::Other { source: src, .. } => {
                *src = Some(source.into());
            }
        }
        self
    }

    /// Add context to the error message
    pub fn with_context(mut self, context: impl Display) -> Self {
        match &mut self {
            Self::Config { message, .. }
            | Self::Storage { message, .. }
            | Self::Transient { message, .. }
            | Self::Credential { message, .. }
            | Self::Conflict { message, .. }
            | Self::Permanent { message, .. }
            | Self::Other { message, .. } => {
                *message = format!("{}: {}", message, context);
            }
        }
        self
    }

    /// Set the external error name on a transient or permanent error
    pub fn with_name(mut self, external_name: impl Into<String>) -> Self {
        match &mut self {
            Self::Transient { name, .. } | Self::Permanent { name, .. } => {
                *name = Some(external_name.into());
            }
            _ => {}
        }
        self
    }

    /// Set the attempt count on a permanent failure
    pub fn with_attempts(mut self, count: u32) -> Self {
        if let Self::Permanent { attempts, .. } = &mut self {
            *attempts = count;
        }
        self
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            Self::Storage { .. } => 4,
            Self::Transient { .. } => 5,
            Self::Credential { .. } => 6,
            Self::Conflict { .. } => 3,
            Self::Permanent { .. } => 7,
            Self::Other { .. } => 1,
        }
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::Config { code, .. }
            | Self::Storage { code, .. }
            | Self::Transient { code, .. }
            | Self::Credential { code, .. }
            | Self::Conflict { code, .. }
            | Self::Permanent { code, .. }
            | Self::Other { code, .. } => *code,
        }
    }

    /// Taxonomy name recorded alongside serialized failures
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "ConfigError",
            Self::Storage { .. } => "StoreIOError",
            Self::Transient { .. } => "TransientExternalError",
            Self::Credential { .. } => "CredentialError",
            Self::Conflict { .. } => "SoftConflictError",
            Self::Permanent { .. } => "PermanentError",
            Self::Other { .. } => "Error",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Config { message, .. }
            | Self::Storage { message, .. }
            | Self::Transient { message, .. }
            | Self::Credential { message, .. }
            | Self::Conflict { message, .. }
            | Self::Permanent { message, .. }
            | Self::Other { message, .. } => message,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config { message, .. } => format!("Configuration problem: {}", message),
            Self::Storage { message, path, .. } => {
                if let Some(p) = path {
                    format!("Status file error at {}: {}", p.display(), message)
                } else {
                    format!("Status file error: {}", message)
                }
            }
            Self::Transient { message, name, .. } | Self::Permanent { message, name, .. } => {
                match name {
                    Some(n) => format!("{}: {}", n, message),
                    None => message.clone(),
                }
            }
            Self::Credential { message, .. } => {
                format!("Authentication required: {}", message)
            }
            Self::Conflict { message, .. } | Self::Other { message, .. } => message.clone(),
        }
    }

    /// Whether the retry driver may attempt the operation again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Credential { .. })
    }

    /// Whether the error only says the desired end state already holds
    pub fn is_soft_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Type alias for Results using StagehandError
pub type Result<T> = std::result::Result<T, StagehandError>;

impl From<toml::de::Error> for StagehandError {
    fn from(err: toml::de::Error) -> Self {
        StagehandError::config_with_code(ErrorCode::CONFIG_INVALID_TOML, "Invalid TOML syntax")
            .with_source(err)
    }
}

impl From<serde_json::Error> for StagehandError {
    fn from(err: serde_json::Error) -> Self {
        StagehandError::storage_with_code(
            ErrorCode::STORAGE_SERIALIZATION_ERROR,
            "Invalid JSON value",
            None,
        )
        .with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation_and_chaining() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "status.yaml");
        let err = StagehandError::storage("Cannot read status file")
            .with_source(io_err)
            .with_context("while loading hub record");

        assert_eq!(err.code(), ErrorCode::STORAGE_GENERIC);
        assert!(err.to_string().contains("[E3000]"));
        assert!(err.user_message().contains("Cannot read status file"));
        assert!(err.user_message().contains("while loading hub record"));

        let source = std::error::Error::source(&err).expect("io error was not kept as source");
        assert_eq!(source.to_string(), "status.yaml");
    }

    #[test]
    fn test_permanent_carries_attempts_and_name() {
        let err = StagehandError::permanent("org signup failed")
            .with_name("RemoteOrgSignupFailed")
            .with_attempts(4);

        assert_eq!(err.kind(), "PermanentError");
        assert!(err.to_string().contains("after 4 attempt(s)"));
        assert_eq!(
            err.user_message(),
            "RemoteOrgSignupFailed: org signup failed"
        );
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(StagehandError::transient("try again").is_retryable());
        assert!(StagehandError::credential("session expired").is_retryable());
        assert!(!StagehandError::permanent("nope").is_retryable());
        assert!(StagehandError::conflict("exists").is_soft_conflict());
    }

    #[test]
    fn test_with_name_ignored_for_storage() {
        let err = StagehandError::storage("disk").with_name("ignored");
        assert_eq!(err.user_message(), "Status file error: disk");
    }
}
