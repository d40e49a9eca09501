//! Retry driver for external-command stages
//!
//! Drives one external command to a terminal state. Each failure is classified
//! and either retried, escalated to a single re-authentication, turned into a
//! bounded wait for the side effect to appear, accepted as already done, or
//! reported as a permanent failure.

pub mod classify;


pub use classify::{classify, classify_legacy, ErrorClass, ExternalError, RunnerErrorCode};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ErrorCode, Result, StagehandError};
use crate::wait::{poll_until, PollOutcome};

/// Limits applied by the retry driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, counting the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed pause between attempts
    #[serde(default, with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Interval between side-effect probes after an infrastructure timeout
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    #[serde(default = "default_max_polls")]
    pub max_polls: u32,

    /// Allow at most one re-authentication per drive
    #[serde(default = "default_true")]
    pub reauthenticate_once: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay: Duration::ZERO,
            poll_interval: default_poll_interval(),
            max_polls: default_max_polls(),
            reauthenticate_once: true,
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_max_polls() -> u32 {
    60
}

fn default_true() -> bool {
    true
}

/// An external command the driver runs, possibly several times
#[async_trait]
pub trait ExternalCommand: Send + Sync {
    /// Run once. `attempt` starts at 1.
    async fn execute(&self, attempt: u32) -> std::result::Result<serde_json::Value, ExternalError>;

    fn describe(&self) -> String {
        "external command".to_string()
    }
}

/// Checks whether a timed-out command's side effect has appeared
#[async_trait]
pub trait SideEffectProbe: Send + Sync {
    async fn observe(&self) -> std::result::Result<bool, ExternalError>;
}

/// Restores credentials for the external system
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `Ok(false)` means the credentials could not be restored
    async fn reauthenticate(&self) -> std::result::Result<bool, ExternalError>;
}

/// How a drive reached success
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The command returned a result
    Completed(serde_json::Value),
    /// The command reported the end state already holds
    AlreadyExisted,
    /// The side effect appeared while waiting after a timeout
    AppearedAfterWait { polls: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriveSuccess {
    pub resolution: Resolution,
    pub attempts: u32,
}

impl DriveSuccess {
    /// The command's result, or `true` when success was inferred
    pub fn into_value(self) -> serde_json::Value {
        match self.resolution {
            Resolution::Completed(value) => value,
            _ => serde_json::Value::Bool(true),
        }
    }
}

/// Driver states. `Succeeded` and `Failed` are terminal.
#[derive(Debug)]
pub enum DriverState {
    Attempting,
    Classifying(ExternalError),
    Reauthenticating(ExternalError),
    Waiting(ExternalError),
    Succeeded(Resolution),
    Failed(StagehandError),
}

impl DriverState {
    fn name(&self) -> &'static str {
        match self {
            DriverState::Attempting => "attempting",
            DriverState::Classifying(_) => "classifying",
            DriverState::Reauthenticating(_) => "reauthenticating",
            DriverState::Waiting(_) => "waiting",
            DriverState::Succeeded(_) => "succeeded",
            DriverState::Failed(_) => "failed",
        }
    }
}

/// Retry driver with optional probe and authenticator collaborators
#[derive(Clone, Default)]
pub struct RetryDriver {
    policy: RetryPolicy,
    probe: Option<Arc<dyn SideEffectProbe>>,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl RetryDriver {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            probe: None,
            authenticator: None,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn SideEffectProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `command` until it succeeds or fails terminally
    pub async fn drive(&self, command: &dyn ExternalCommand) -> Result<DriveSuccess> {
        let description = command.describe();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        let mut reauthentications = 0u32;
        let mut state = DriverState::Attempting;

        loop {
            debug!(
                "{}: {} (attempt {}/{})",
                description,
                state.name(),
                attempt,
                max_attempts
            );

            state = match state {
                DriverState::Attempting => match command.execute(attempt).await {
                    Ok(value) => DriverState::Succeeded(Resolution::Completed(value)),
                    Err(error) => DriverState::Classifying(error),
                },

                DriverState::Classifying(error) => {
                    let class = classify(&error);
                    warn!("{} failed with {} error: {}", description, class, error);

                    match class {
                        ErrorClass::Duplicate => DriverState::Succeeded(Resolution::AlreadyExisted),
                        ErrorClass::Permanent => {
                            DriverState::Failed(permanent_failure(error, attempt))
                        }
                        _ if attempt >= max_attempts => {
                            DriverState::Failed(retries_exhausted(error, attempt))
                        }
                        ErrorClass::InfrastructureTimeout if self.probe.is_some() => {
                            DriverState::Waiting(error)
                        }
                        ErrorClass::StaleCredential => {
                            if self.authenticator.is_none() {
                                DriverState::Failed(stale_credential(error, NO_AUTHENTICATOR))
                            } else if self.policy.reauthenticate_once && reauthentications > 0 {
                                DriverState::Failed(stale_credential(error, STILL_STALE))
                            } else {
                                DriverState::Reauthenticating(error)
                            }
                        }
                        ErrorClass::InfrastructureTimeout
                        | ErrorClass::Transient
                        | ErrorClass::Unrecognized => {
                            attempt = self.next_attempt(&description, attempt, max_attempts).await;
                            DriverState::Attempting
                        }
                    }
                }

                DriverState::Reauthenticating(error) => {
                    reauthentications += 1;
                    match self.reauthenticate().await {
                        Ok(()) => {
                            info!("Re-authenticated after {}", error.name);
                            attempt = self.next_attempt(&description, attempt, max_attempts).await;
                            DriverState::Attempting
                        }
                        Err(e) => DriverState::Failed(e),
                    }
                }

                DriverState::Waiting(error) => {
                    let outcome = self.wait_for_side_effect(&description).await;
                    match outcome {
                        Ok(PollOutcome::Observed { polls }) => {
                            DriverState::Succeeded(Resolution::AppearedAfterWait { polls })
                        }
                        Ok(PollOutcome::Exhausted { polls }) => {
                            let message = format!(
                                "{} did not appear after {} polls every {:?}",
                                description, polls, self.policy.poll_interval
                            );
                            DriverState::Failed(timed_out(
                                ErrorCode::STAGE_WAIT_EXHAUSTED,
                                message,
                                error,
                                attempt,
                            ))
                        }
                        Err(probe_error) => {
                            let message = format!("probe failed while waiting: {}", probe_error);
                            DriverState::Failed(timed_out(
                                ErrorCode::EXEC_TIMEOUT,
                                message,
                                error,
                                attempt,
                            ))
                        }
                    }
                }

                DriverState::Succeeded(resolution) => {
                    info!("{} succeeded after {} attempt(s)", description, attempt);
                    return Ok(DriveSuccess {
                        resolution,
                        attempts: attempt,
                    });
                }

                DriverState::Failed(error) => {
                    warn!("{} failed: {}", description, error);
                    return Err(error);
                }
            };
        }
    }

    async fn next_attempt(&self, description: &str, attempt: u32, max_attempts: u32) -> u32 {
        let next = attempt + 1;
        info!(
            "Retrying {} (attempt {}/{}) after {:?}",
            description, next, max_attempts, self.policy.retry_delay
        );
        if !self.policy.retry_delay.is_zero() {
            tokio::time::sleep(self.policy.retry_delay).await;
        }
        next
    }

    async fn reauthenticate(&self) -> Result<()> {
        let Some(authenticator) = &self.authenticator else {
            return Err(StagehandError::credential("no authenticator configured"));
        };

        match authenticator.reauthenticate().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(StagehandError::credential_with_code(
                ErrorCode::EXEC_AUTH_FAILED,
                "Auth Failed",
            )),
            Err(e) => Err(StagehandError::credential_with_code(
                ErrorCode::EXEC_AUTH_FAILED,
                "Auth Failed",
            )
            .with_source(e)),
        }
    }

    async fn wait_for_side_effect(
        &self,
        description: &str,
    ) -> std::result::Result<PollOutcome, ExternalError> {
        let Some(probe) = self.probe.as_deref() else {
            return Ok(PollOutcome::Exhausted { polls: 0 });
        };

        info!(
            "Waiting for {} to appear (every {:?}, up to {} polls)",
            description, self.policy.poll_interval, self.policy.max_polls
        );
        poll_until(
            self.policy.poll_interval,
            self.policy.max_polls,
            move |_| probe.observe(),
        )
        .await
    }
}

fn error_code_for(error: &ExternalError) -> u16 {
    match error.code {
        Some(RunnerErrorCode::AccessDenied) => ErrorCode::EXEC_ACCESS_DENIED,
        Some(RunnerErrorCode::Unparseable) => ErrorCode::EXEC_UNPARSEABLE,
        _ if error.name == "ACCESS_DENIED" => ErrorCode::EXEC_ACCESS_DENIED,
        _ => ErrorCode::STAGE_FAILED,
    }
}

const NO_AUTHENTICATOR: &str = "no authenticator configured";
const STILL_STALE: &str = "credentials still stale after re-authentication";

fn stale_credential(error: ExternalError, reason: &str) -> StagehandError {
    StagehandError::credential(error.message.clone())
        .with_context(reason)
        .with_source(error)
}

fn timed_out(code: u16, message: String, error: ExternalError, attempt: u32) -> StagehandError {
    StagehandError::permanent_with_code(code, message)
        .with_name(error.name.clone())
        .with_attempts(attempt)
        .with_source(error)
}

fn permanent_failure(error: ExternalError, attempt: u32) -> StagehandError {
    StagehandError::permanent_with_code(error_code_for(&error), error.message.clone())
        .with_name(error.name.clone())
        .with_attempts(attempt)
        .with_source(error)
}

fn retries_exhausted(error: ExternalError, attempt: u32) -> StagehandError {
    StagehandError::permanent_with_code(ErrorCode::STAGE_RETRIES_EXHAUSTED, error.message.clone())
        .with_name(error.name.clone())
        .with_attempts(attempt)
        .with_source(error)
}
