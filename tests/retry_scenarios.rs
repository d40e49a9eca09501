//! Retry driver outcomes as seen through recorded stage status

use serde_json::json;
use stagehand::retry::{ExternalError, RetryDriver, RetryPolicy, RunnerErrorCode};
use stagehand::storage::{fields, CheckpointStore, Identity, Level};
use stagehand::testing::{ScriptedAuth, ScriptedCommand, ScriptedProbe};
use stagehand::{Completion, ErrorCode, StageRunner};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn policy() -> RetryPolicy {
    RetryPolicy {
        poll_interval: Duration::from_millis(1),
        max_polls: 4,
        ..RetryPolicy::default()
    }
}

fn org() -> Identity {
    Identity::new("admin@hub", "admin@org", "")
}

async fn runner_with(temp: &TempDir, driver: RetryDriver) -> StageRunner {
    let store = CheckpointStore::open_at(temp.path().join("status.yaml"))
        .await
        .unwrap();
    StageRunner::with_driver(store, driver)
}

async fn recorded_failure(runner: &StageRunner, key: &str) -> stagehand::ErrorRecord {
    runner
        .store()
        .get(&org(), Level::SubEnv, key)
        .await
        .unwrap()
        .and_then(|value| value.as_error().cloned())
        .expect("failure was not recorded")
}

#[tokio::test]
async fn test_unrecognized_error_stops_at_attempt_ceiling() {
    let temp = TempDir::new().unwrap();
    let runner = runner_with(&temp, RetryDriver::new(policy())).await;
    let command =
        ScriptedCommand::always_failing(ExternalError::new("GenericFailure", "it broke"));

    let error = runner
        .run_with_retry(&org(), Level::SubEnv, fields::CREATED, &command)
        .await
        .unwrap_err();

    assert_eq!(command.attempts_seen(), vec![1, 2, 3, 4]);
    assert_eq!(error.code(), ErrorCode::STAGE_RETRIES_EXHAUSTED);

    let record = recorded_failure(&runner, fields::CREATED).await;
    assert_eq!(record.kind, "PermanentError");
    assert_eq!(record.attempts, Some(4));
    assert_eq!(record.name.as_deref(), Some("GenericFailure"));
}

#[tokio::test]
async fn test_already_in_use_counts_as_done() {
    let temp = TempDir::new().unwrap();
    let runner = runner_with(&temp, RetryDriver::new(policy())).await;
    let command = ScriptedCommand::always_failing(ExternalError::new(
        "RemoteOrgSignupFailed",
        "The username is already in use",
    ));

    let completion = runner
        .run_with_retry(&org(), Level::SubEnv, fields::CREATED, &command)
        .await
        .unwrap();

    assert_eq!(completion, Completion::Ran(json!(true)));
    assert_eq!(command.calls(), 1);
}

#[tokio::test]
async fn test_stale_credential_reauthenticates_once() {
    let temp = TempDir::new().unwrap();
    let auth = ScriptedAuth::succeeding();
    let driver = RetryDriver::new(policy()).with_authenticator(Arc::new(auth.clone()));
    let runner = runner_with(&temp, driver).await;
    let command = ScriptedCommand::new([
        Err(ExternalError::new("DevhubNotAuthorized", "session expired")),
        Ok(json!({"username": "admin@org"})),
    ]);

    let completion = runner
        .run_with_retry(&org(), Level::SubEnv, fields::AUTHED, &command)
        .await
        .unwrap();

    assert_eq!(completion.into_inner(), json!({"username": "admin@org"}));
    assert_eq!(auth.calls(), 1);
    assert_eq!(command.calls(), 2);
}

#[tokio::test]
async fn test_refused_reauthentication_is_recorded() {
    let temp = TempDir::new().unwrap();
    let auth = ScriptedAuth::refusing();
    let driver = RetryDriver::new(policy()).with_authenticator(Arc::new(auth.clone()));
    let runner = runner_with(&temp, driver).await;
    let command = ScriptedCommand::always_failing(ExternalError::coded(
        RunnerErrorCode::StaleCredential,
        "AuthExpired",
        "token revoked",
    ));

    let error = runner
        .run_with_retry(&org(), Level::SubEnv, fields::AUTHED, &command)
        .await
        .unwrap_err();

    assert_eq!(error.code(), ErrorCode::EXEC_AUTH_FAILED);
    assert_eq!(auth.calls(), 1);
    assert_eq!(command.calls(), 1);

    let record = recorded_failure(&runner, fields::AUTHED).await;
    assert_eq!(record.kind, "CredentialError");
    assert_eq!(record.message, "Auth Failed");
}

#[tokio::test]
async fn test_timeout_probe_gives_up_after_max_polls() {
    let temp = TempDir::new().unwrap();
    let probe = ScriptedProbe::never();
    let driver = RetryDriver::new(policy()).with_probe(Arc::new(probe.clone()));
    let runner = runner_with(&temp, driver).await;
    let command = ScriptedCommand::always_failing(ExternalError::new(
        "MyDomainResolverTimeoutError",
        "resolver did not answer",
    ));

    let error = runner
        .run_with_retry(&org(), Level::SubEnv, fields::CREATED, &command)
        .await
        .unwrap_err();

    assert_eq!(error.code(), ErrorCode::STAGE_WAIT_EXHAUSTED);
    assert_eq!(probe.calls(), 4);
    assert_eq!(command.calls(), 1);

    let record = recorded_failure(&runner, fields::CREATED).await;
    assert_eq!(record.code, ErrorCode::STAGE_WAIT_EXHAUSTED);
}

#[tokio::test]
async fn test_timeout_probe_finds_side_effect() {
    let temp = TempDir::new().unwrap();
    let probe = ScriptedProbe::appearing_on(2);
    let driver = RetryDriver::new(policy()).with_probe(Arc::new(probe.clone()));
    let runner = runner_with(&temp, driver).await;
    let command = ScriptedCommand::always_failing(ExternalError::coded(
        RunnerErrorCode::InfrastructureTimeout,
        "ResolverTimeout",
        "timed out",
    ));

    let completion = runner
        .run_with_retry(&org(), Level::SubEnv, fields::CREATED, &command)
        .await
        .unwrap();

    assert_eq!(completion, Completion::Ran(json!(true)));
    assert_eq!(probe.calls(), 2);
}
