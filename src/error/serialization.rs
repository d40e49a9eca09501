use super::StagehandError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Serialized failure payload recorded into the status document.
///
/// Writing one of these at a field marks the stage's last known failure. The
/// store never interprets it; stage callers branch on it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    /// Taxonomy kind (`PermanentError`, `CredentialError`, ...)
    pub kind: String,
    /// Numeric error code
    pub code: u16,
    /// Error name reported by the external tool, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// User-facing message
    pub message: String,
    /// Attempts made before giving up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    /// Source chain, outermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ErrorRecord {
    /// Build a record for an arbitrary error that did not go through the driver
    pub fn from_display(kind: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self {
            kind: kind.into(),
            code: super::ErrorCode::OTHER_GENERIC,
            name: None,
            message: message.to_string(),
            attempts: None,
            causes: Vec::new(),
            recorded_at: Utc::now(),
        }
    }
}

impl From<&StagehandError> for ErrorRecord {
    fn from(error: &StagehandError) -> Self {
        let (name, attempts) = match error {
            StagehandError::Permanent { name, attempts, .. } => (name.clone(), Some(*attempts)),
            StagehandError::Transient { name, .. } => (name.clone(), None),
            _ => (None, None),
        };

        let mut causes = Vec::new();
        let mut source = std::error::Error::source(error);
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            kind: error.kind().to_string(),
            code: error.code(),
            name,
            message: error.message().to_string(),
            attempts,
            causes,
            recorded_at: Utc::now(),
        }
    }
}

impl StagehandError {
    /// Convert error to the payload recorded in the status document
    pub fn to_record(&self) -> ErrorRecord {
        ErrorRecord::from(self)
    }
}
