//! Commands that report their outcome as a JSON envelope on stdout
//!
//! Success: `{"status": 0, "result": ...}`.
//! Failure: `{"status": 1, "name": "...", "message": "...", "code": "stale_credential"}`,
//! where `code` is optional.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::runner::{ProcessCommand, ProcessOutput, ProcessRunner, TokioProcessRunner};
use crate::retry::{Authenticator, ExternalCommand, ExternalError, RunnerErrorCode, SideEffectProbe};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Read a command's output as a success payload or a structured error
pub fn parse_envelope(output: &ProcessOutput) -> Result<serde_json::Value, ExternalError> {
    let stdout = output.stdout.trim();
    let envelope: Envelope = match serde_json::from_str(stdout) {
        Ok(envelope) => envelope,
        Err(_) => {
            let raw = if stdout.is_empty() {
                output.stderr.trim()
            } else {
                stdout
            };
            return Err(ExternalError::unparseable(raw));
        }
    };

    if envelope.status == 0 && output.status.success() {
        return Ok(envelope.result.unwrap_or(serde_json::Value::Null));
    }

    // Codes outside the known vocabulary fall back to name matching
    let code = envelope
        .code
        .and_then(|c| serde_json::from_value::<RunnerErrorCode>(c).ok());
    let message = envelope.message.unwrap_or_else(|| {
        let stderr = output.stderr.trim();
        if stderr.is_empty() {
            format!("command exited with {:?}", output.status)
        } else {
            stderr.to_string()
        }
    });

    Err(ExternalError {
        code,
        name: envelope.name.unwrap_or_else(|| "CommandFailed".to_string()),
        message,
    })
}

/// Runs one command through a process runner and parses its JSON envelope
#[derive(Clone)]
pub struct JsonCommandRunner {
    runner: Arc<dyn ProcessRunner>,
    command: ProcessCommand,
}

impl JsonCommandRunner {
    pub fn new(command: ProcessCommand) -> Self {
        Self::with_runner(Arc::new(TokioProcessRunner), command)
    }

    pub fn with_runner(runner: Arc<dyn ProcessRunner>, command: ProcessCommand) -> Self {
        Self { runner, command }
    }

    pub fn command(&self) -> &ProcessCommand {
        &self.command
    }

    pub async fn run_once(&self) -> Result<serde_json::Value, ExternalError> {
        let output = self.runner.run(self.command.clone()).await?;
        parse_envelope(&output)
    }
}

#[async_trait]
impl ExternalCommand for JsonCommandRunner {
    async fn execute(&self, attempt: u32) -> Result<serde_json::Value, ExternalError> {
        tracing::debug!("Running {} (attempt {})", self.command.display(), attempt);
        self.run_once().await
    }

    fn describe(&self) -> String {
        self.command.program.clone()
    }
}

/// Probe backed by a command: the side effect exists when the command
/// succeeds with a result that is not `null`, `false` or empty
#[derive(Clone)]
pub struct CommandProbe {
    inner: JsonCommandRunner,
}

impl CommandProbe {
    pub fn new(inner: JsonCommandRunner) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl SideEffectProbe for CommandProbe {
    async fn observe(&self) -> Result<bool, ExternalError> {
        match self.inner.run_once().await {
            Ok(value) => Ok(is_truthy(&value)),
            Err(e) if e.code == Some(RunnerErrorCode::Unparseable) => Err(e),
            Err(e) => {
                tracing::debug!("Probe {} reported {}", self.inner.describe(), e);
                Ok(false)
            }
        }
    }
}

/// Authenticator backed by a command; any successful envelope counts as authenticated
#[derive(Clone)]
pub struct CommandAuthenticator {
    inner: JsonCommandRunner,
}

impl CommandAuthenticator {
    pub fn new(inner: JsonCommandRunner) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Authenticator for CommandAuthenticator {
    async fn reauthenticate(&self) -> Result<bool, ExternalError> {
        match self.inner.run_once().await {
            Ok(value) => Ok(!matches!(value, serde_json::Value::Bool(false))),
            Err(e) => {
                tracing::warn!("Re-authentication via {} failed: {}", self.inner.describe(), e);
                Ok(false)
            }
        }
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(items) => !items.is_empty(),
        serde_json::Value::Object(map) => !map.is_empty(),
        serde_json::Value::Number(_) => true,
    }
}
