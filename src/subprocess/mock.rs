use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner};

/// Process runner that replays queued outputs per program
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    expectations: Arc<Mutex<Vec<MockExpectation>>>,
    call_history: Arc<Mutex<Vec<ProcessCommand>>>,
}

struct MockExpectation {
    program: String,
    responses: VecDeque<ProcessOutput>,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an output for the next call to `program`. The last queued output repeats.
    pub fn respond(&self, program: &str, exit_code: i32, stdout: &str, stderr: &str) {
        let output = ProcessOutput {
            status: if exit_code == 0 {
                ExitStatus::Success
            } else {
                ExitStatus::Error(exit_code)
            },
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration: Duration::from_millis(10),
        };

        let mut expectations = self.expectations.lock().unwrap();
        match expectations.iter_mut().find(|e| e.program == program) {
            Some(expectation) => expectation.responses.push_back(output),
            None => expectations.push(MockExpectation {
                program: program.to_string(),
                responses: VecDeque::from([output]),
            }),
        }
    }

    pub fn verify_called(&self, program: &str, times: usize) -> bool {
        let history = self.call_history.lock().unwrap();
        let count = history.iter().filter(|cmd| cmd.program == program).count();
        count == times
    }

    pub fn get_call_history(&self) -> Vec<ProcessCommand> {
        self.call_history.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        self.call_history.lock().unwrap().push(command.clone());

        let mut expectations = self.expectations.lock().unwrap();
        let expectation = expectations
            .iter_mut()
            .find(|e| e.program == command.program)
            .ok_or_else(|| {
                ProcessError::MockExpectationNotMet(format!(
                    "No expectation found for command: {} {:?}",
                    command.program, command.args
                ))
            })?;

        let output = if expectation.responses.len() > 1 {
            expectation.responses.pop_front()
        } else {
            expectation.responses.front().cloned()
        };
        output.ok_or_else(|| {
            ProcessError::MockExpectationNotMet(format!("No output queued for {}", command.program))
        })
    }
}
