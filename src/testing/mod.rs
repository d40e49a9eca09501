//! Scripted collaborators for testing stages and the retry driver
//!
//! Each collaborator replays a fixed script of responses and records how often
//! it was called, in the spirit of a mock process runner.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::retry::{Authenticator, ExternalCommand, ExternalError, SideEffectProbe};

type CommandResponse = Result<serde_json::Value, ExternalError>;

/// External command that returns scripted responses in order.
///
/// Once the script runs out, the fallback response repeats. Without a
/// fallback, further calls fail with an unrecognized `ScriptExhausted` error.
#[derive(Clone, Default)]
pub struct ScriptedCommand {
    script: Arc<Mutex<VecDeque<CommandResponse>>>,
    fallback: Option<CommandResponse>,
    attempts_seen: Arc<Mutex<Vec<u32>>>,
}

impl ScriptedCommand {
    pub fn new(script: impl IntoIterator<Item = CommandResponse>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            ..Self::default()
        }
    }

    /// A command that fails with `error` on every call
    pub fn always_failing(error: ExternalError) -> Self {
        Self::default().then_always(Err(error))
    }

    pub fn succeeding(value: serde_json::Value) -> Self {
        Self::default().then_always(Ok(value))
    }

    pub fn then_always(mut self, response: CommandResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    pub fn calls(&self) -> usize {
        self.attempts_seen.lock().unwrap().len()
    }

    /// Attempt numbers the driver passed, in call order
    pub fn attempts_seen(&self) -> Vec<u32> {
        self.attempts_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExternalCommand for ScriptedCommand {
    async fn execute(&self, attempt: u32) -> CommandResponse {
        self.attempts_seen.lock().unwrap().push(attempt);
        let next = self.script.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(response), _) => response,
            (None, Some(fallback)) => fallback.clone(),
            (None, None) => Err(ExternalError::new(
                "ScriptExhausted",
                format!("no scripted response for attempt {}", attempt),
            )),
        }
    }

    fn describe(&self) -> String {
        "scripted command".to_string()
    }
}

/// Probe that reports scripted observations, then `false` forever
#[derive(Clone, Default)]
pub struct ScriptedProbe {
    script: Arc<Mutex<VecDeque<Result<bool, ExternalError>>>>,
    calls: Arc<Mutex<usize>>,
}

impl ScriptedProbe {
    pub fn new(script: impl IntoIterator<Item = Result<bool, ExternalError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Side effect appears on poll number `poll`
    pub fn appearing_on(poll: usize) -> Self {
        let mut script = vec![Ok(false); poll.saturating_sub(1)];
        script.push(Ok(true));
        Self::new(script)
    }

    pub fn never() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl SideEffectProbe for ScriptedProbe {
    async fn observe(&self) -> Result<bool, ExternalError> {
        *self.calls.lock().unwrap() += 1;
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(false))
    }
}

/// Authenticator returning a fixed outcome
#[derive(Clone)]
pub struct ScriptedAuth {
    outcome: Result<bool, ExternalError>,
    calls: Arc<Mutex<usize>>,
}

impl ScriptedAuth {
    pub fn succeeding() -> Self {
        Self::with_outcome(Ok(true))
    }

    pub fn refusing() -> Self {
        Self::with_outcome(Ok(false))
    }

    pub fn with_outcome(outcome: Result<bool, ExternalError>) -> Self {
        Self {
            outcome,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Authenticator for ScriptedAuth {
    async fn reauthenticate(&self) -> Result<bool, ExternalError> {
        *self.calls.lock().unwrap() += 1;
        self.outcome.clone()
    }
}
