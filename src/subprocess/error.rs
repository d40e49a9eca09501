use crate::error::{ErrorCode, StagehandError};
use crate::retry::{ExternalError, RunnerErrorCode};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Invalid command line: {0}")]
    InvalidCommand(String),

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error running {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Mock expectation not met: {0}")]
    MockExpectationNotMet(String),
}

/// Convert ProcessError to StagehandError
impl From<ProcessError> for StagehandError {
    fn from(err: ProcessError) -> Self {
        let code = match &err {
            ProcessError::CommandNotFound(_) => ErrorCode::EXEC_COMMAND_NOT_FOUND,
            ProcessError::InvalidCommand(_) => ErrorCode::CONFIG_INVALID_VALUE,
            ProcessError::Timeout(_) => ErrorCode::EXEC_TIMEOUT,
            ProcessError::Io { .. } => ErrorCode::EXEC_SUBPROCESS_FAILED,
            ProcessError::MockExpectationNotMet(_) => ErrorCode::EXEC_GENERIC,
        };
        match err {
            ProcessError::InvalidCommand(_) => {
                StagehandError::config_with_code(code, err.to_string()).with_source(err)
            }
            ProcessError::Timeout(_) | ProcessError::Io { .. } => {
                StagehandError::transient_with_code(code, err.to_string()).with_source(err)
            }
            _ => StagehandError::permanent_with_code(code, err.to_string()).with_source(err),
        }
    }
}

/// How a failure to run the process at all looks to the retry driver
impl From<ProcessError> for ExternalError {
    fn from(err: ProcessError) -> Self {
        let (code, name) = match &err {
            ProcessError::CommandNotFound(_) => (RunnerErrorCode::Permanent, "CommandNotFound"),
            ProcessError::InvalidCommand(_) => (RunnerErrorCode::Permanent, "InvalidCommand"),
            ProcessError::Timeout(_) => (RunnerErrorCode::Transient, "ProcessTimeout"),
            ProcessError::Io { .. } => (RunnerErrorCode::Transient, "ProcessIoError"),
            ProcessError::MockExpectationNotMet(_) => (RunnerErrorCode::Permanent, "MockError"),
        };
        ExternalError::coded(code, name, err.to_string())
    }
}
