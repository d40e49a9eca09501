//! Classification of errors reported by external commands

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::error::{ErrorCode, StagehandError};

/// Structured error code an external runner may attach to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerErrorCode {
    /// The side effect may still materialize; wait for it
    InfrastructureTimeout,
    StaleCredential,
    /// The desired end state already holds
    AlreadyExists,
    Transient,
    AccessDenied,
    Permanent,
    /// The runner could not parse the command's output
    Unparseable,
}

/// A failure reported by an external command
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{name}: {message}")]
pub struct ExternalError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<RunnerErrorCode>,
    pub name: String,
    pub message: String,
}

impl ExternalError {
    /// Error known only by the external tool's name and message
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: None,
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn coded(
        code: RunnerErrorCode,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: Some(code),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Output that could not be read as a structured result
    pub fn unparseable(raw: impl Into<String>) -> Self {
        Self::coded(RunnerErrorCode::Unparseable, "UnparseableOutput", raw)
    }

    pub fn with_code(mut self, code: RunnerErrorCode) -> Self {
        self.code = Some(code);
        self
    }
}

/// How the driver reacts to an external error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    InfrastructureTimeout,
    StaleCredential,
    Duplicate,
    Transient,
    /// Never retried
    Permanent,
    /// Retried until the attempt ceiling
    Unrecognized,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::InfrastructureTimeout => "infrastructure timeout",
            ErrorClass::StaleCredential => "stale credential",
            ErrorClass::Duplicate => "already exists",
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
            ErrorClass::Unrecognized => "unrecognized",
        };
        f.write_str(name)
    }
}

// Error names used by the provisioning CLI the pipeline shells out to
const RESOLVER_TIMEOUT: &str = "MyDomainResolverTimeoutError";
const HUB_NOT_AUTHORIZED: &str = "DevhubNotAuthorized";
const GENERIC_TIMEOUT: &str = "genericTimeoutMessage";
const ACCESS_DENIED: &str = "ACCESS_DENIED";
const SIGNUP_FAILED: &str = "RemoteOrgSignupFailed";
const ALREADY_IN_USE: &str = "already in use";
const PLEASE_TRY_AGAIN: &str = "please try again";
const DUPLICATE_VALUE: &str = "DUPLICATE_VALUE";
const DUPLICATE: &str = "duplicate";
const ALREADY_EXISTS: &str = "already exists";

/// Classify an external error, preferring its structured code
pub fn classify(error: &ExternalError) -> ErrorClass {
    match error.code {
        Some(code) => classify_code(code),
        None => classify_legacy(&error.name, &error.message),
    }
}

fn classify_code(code: RunnerErrorCode) -> ErrorClass {
    match code {
        RunnerErrorCode::InfrastructureTimeout => ErrorClass::InfrastructureTimeout,
        RunnerErrorCode::StaleCredential => ErrorClass::StaleCredential,
        RunnerErrorCode::AlreadyExists => ErrorClass::Duplicate,
        RunnerErrorCode::Transient => ErrorClass::Transient,
        RunnerErrorCode::AccessDenied
        | RunnerErrorCode::Permanent
        | RunnerErrorCode::Unparseable => ErrorClass::Permanent,
    }
}

/// Name and message matching for runners that report no structured code
pub fn classify_legacy(name: &str, message: &str) -> ErrorClass {
    if name == RESOLVER_TIMEOUT || message.contains(RESOLVER_TIMEOUT) {
        return ErrorClass::InfrastructureTimeout;
    }

    match name {
        HUB_NOT_AUTHORIZED | GENERIC_TIMEOUT => ErrorClass::StaleCredential,
        ACCESS_DENIED => ErrorClass::Permanent,
        SIGNUP_FAILED => {
            let message = message.to_lowercase();
            if message.contains(ALREADY_IN_USE) {
                ErrorClass::Duplicate
            } else if message.contains(PLEASE_TRY_AGAIN) {
                ErrorClass::Transient
            } else {
                ErrorClass::Permanent
            }
        }
        DUPLICATE_VALUE => ErrorClass::Duplicate,
        _ => {
            let message = message.to_lowercase();
            if message.contains(DUPLICATE) || message.contains(ALREADY_EXISTS) {
                ErrorClass::Duplicate
            } else {
                ErrorClass::Unrecognized
            }
        }
    }
}

/// Surface an external failure outside the driver, in the matching category
impl From<ExternalError> for StagehandError {
    fn from(error: ExternalError) -> Self {
        let converted = match classify(&error) {
            ErrorClass::Duplicate => StagehandError::conflict(error.message.clone()),
            ErrorClass::StaleCredential => StagehandError::credential(error.message.clone()),
            ErrorClass::Transient => StagehandError::transient(error.message.clone()),
            ErrorClass::InfrastructureTimeout => {
                StagehandError::transient_with_code(ErrorCode::EXEC_TIMEOUT, error.message.clone())
            }
            ErrorClass::Permanent | ErrorClass::Unrecognized => {
                let code = super::error_code_for(&error);
                StagehandError::permanent_with_code(code, error.message.clone())
            }
        };
        converted.with_name(error.name.clone()).with_source(error)
    }
}
