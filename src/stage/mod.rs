//! Resumable stages
//!
//! A stage checks its status field before doing any work, runs only when the
//! field does not record success, and commits either success or the failure
//! payload back to the store. Recorded failures never gate a rerun.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use tracing::{info, warn};

use crate::error::{Result, StagehandError};
use crate::retry::{ExternalCommand, RetryDriver};
use crate::storage::{CheckpointStore, FieldValue, Identity, Level};

/// Whether a stage did its work on this invocation
#[derive(Debug, Clone, PartialEq)]
pub enum Completion<T> {
    /// A previous run had already recorded success
    Skipped(T),
    Ran(T),
}

impl<T> Completion<T> {
    pub fn was_skipped(&self) -> bool {
        matches!(self, Completion::Skipped(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Completion::Skipped(value) | Completion::Ran(value) => value,
        }
    }
}

/// Runs stages against one store, scoped to a pipeline run
#[derive(Clone)]
pub struct StageRunner {
    store: CheckpointStore,
    driver: RetryDriver,
}

impl StageRunner {
    pub fn new(store: CheckpointStore) -> Self {
        Self::with_driver(store, RetryDriver::default())
    }

    pub fn with_driver(store: CheckpointStore, driver: RetryDriver) -> Self {
        Self { store, driver }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Run `work` unless `key` already records success, then mark it `true`.
    ///
    /// A soft conflict from `work` means the end state already holds and
    /// counts as success.
    pub async fn run<F, Fut>(
        &self,
        identity: &Identity,
        level: Level,
        key: &str,
        work: F,
    ) -> Result<Completion<()>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.completed(identity, level, key).await?.is_some() {
            return Ok(Completion::Skipped(()));
        }

        info!("Running stage {} for {}", key, identity);
        let outcome = match work().await {
            Err(error) if error.is_soft_conflict() => {
                info!("Stage {} for {} already in place: {}", key, identity, error);
                Ok(())
            }
            other => other,
        };
        match outcome {
            Ok(()) => {
                self.store.set(identity, level, key, true).await?;
                info!("Stage {} completed for {}", key, identity);
                Ok(Completion::Ran(()))
            }
            Err(error) => Err(self.record_failure(identity, level, key, error).await),
        }
    }

    /// Like `run`, but the stage's result is stored and returned on later skips
    pub async fn run_recorded<T, F, Fut>(
        &self,
        identity: &Identity,
        level: Level,
        key: &str,
        work: F,
    ) -> Result<Completion<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(cached) = self.completed(identity, level, key).await? {
            match cached.decode::<T>() {
                Ok(value) => return Ok(Completion::Skipped(value)),
                Err(e) => warn!(
                    "Recorded value for {} on {} is unreadable, running again: {}",
                    key, identity, e
                ),
            }
        }

        info!("Running stage {} for {}", key, identity);
        match work().await {
            Ok(value) => {
                let encoded = FieldValue::encode(&value)?;
                self.store.set(identity, level, key, encoded).await?;
                info!("Stage {} completed for {}", key, identity);
                Ok(Completion::Ran(value))
            }
            Err(error) => Err(self.record_failure(identity, level, key, error).await),
        }
    }

    /// Drive an external command through the retry driver as a resumable stage.
    ///
    /// The command's JSON result is recorded, or `true` when it returned
    /// nothing that reads as done.
    pub async fn run_with_retry(
        &self,
        identity: &Identity,
        level: Level,
        key: &str,
        command: &dyn ExternalCommand,
    ) -> Result<Completion<serde_json::Value>> {
        if let Some(cached) = self.completed(identity, level, key).await? {
            return Ok(Completion::Skipped(cached.to_json()));
        }

        info!(
            "Running stage {} for {} via {}",
            key,
            identity,
            command.describe()
        );
        match self.driver.drive(command).await {
            Ok(success) => {
                let attempts = success.attempts;
                let mut marker = FieldValue::from_json(success.into_value());
                if !marker.is_done() {
                    marker = FieldValue::Bool(true);
                }
                let value = marker.to_json();
                self.store.set(identity, level, key, marker).await?;
                info!(
                    "Stage {} completed for {} after {} attempt(s)",
                    key, identity, attempts
                );
                Ok(Completion::Ran(value))
            }
            Err(error) => Err(self.record_failure(identity, level, key, error).await),
        }
    }

    /// The recorded value if it marks success
    async fn completed(
        &self,
        identity: &Identity,
        level: Level,
        key: &str,
    ) -> Result<Option<FieldValue>> {
        let value = self.store.get(identity, level, key).await?;
        match value {
            Some(value) if value.is_done() => {
                info!("Skipping stage {} for {}: already done", key, identity);
                Ok(Some(value))
            }
            Some(value) if value.is_failure() => {
                info!(
                    "Stage {} for {} previously failed ({}), running again",
                    key, identity, value
                );
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Write the failure payload and hand back the original error
    async fn record_failure(
        &self,
        identity: &Identity,
        level: Level,
        key: &str,
        error: StagehandError,
    ) -> StagehandError {
        warn!("Stage {} failed for {}: {}", key, identity, error);
        if let Err(store_error) = self
            .store
            .set(identity, level, key, error.to_record())
            .await
        {
            warn!(
                "Could not record failure of stage {} for {}: {}",
                key, identity, store_error
            );
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::retry::{ExternalError, RetryPolicy};
    use crate::storage::{fields, UserInfo};
    use crate::testing::ScriptedCommand;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    async fn runner(temp: &TempDir) -> StageRunner {
        let store = CheckpointStore::open_at(temp.path().join("status.yaml"))
            .await
            .unwrap();
        StageRunner::new(store)
    }

    fn identity() -> Identity {
        Identity::new("hubA", "orgA", "storeA")
    }

    #[tokio::test]
    async fn test_completed_stage_is_skipped() {
        let temp = TempDir::new().unwrap();
        let runner = runner(&temp).await;
        let calls = AtomicU32::new(0);
        let key = fields::PUSHED_SOURCES;

        for _ in 0..3 {
            runner
                .run(&identity(), Level::SubResource, key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_rethrown() {
        let temp = TempDir::new().unwrap();
        let runner = runner(&temp).await;
        let key = fields::INDEX_CREATED;

        let error = runner
            .run(&identity(), Level::SubResource, key, || async {
                Err(StagehandError::permanent("search index rejected"))
            })
            .await
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::STAGE_FAILED);

        let recorded = runner
            .store()
            .get(&identity(), Level::SubResource, key)
            .await
            .unwrap()
            .unwrap();
        let record = recorded.as_error().unwrap();
        assert_eq!(record.kind, "PermanentError");
        assert_eq!(record.message, "search index rejected");
    }

    #[tokio::test]
    async fn test_recorded_failure_does_not_gate_rerun() {
        let temp = TempDir::new().unwrap();
        let runner = runner(&temp).await;
        let key = fields::COMMUNITY_PUBLISHED;

        let _ = runner
            .run(&identity(), Level::SubResource, key, || async {
                Err(StagehandError::transient("publish timed out"))
            })
            .await;

        let completion = runner
            .run(&identity(), Level::SubResource, key, || async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(completion, Completion::Ran(()));
        assert_eq!(
            runner
                .store()
                .get(&identity(), Level::SubResource, key)
                .await
                .unwrap(),
            Some(FieldValue::Bool(true))
        );
    }

    #[tokio::test]
    async fn test_hand_written_failure_does_not_gate_rerun() {
        let temp = TempDir::new().unwrap();
        let runner = runner(&temp).await;
        let status = r#"
hubs:
  hubA:
    sub_envs:
      orgA:
        created:
          failed:
          - some reason it failed
"#;
        std::fs::write(runner.store().path(), status).unwrap();
        let calls = AtomicU32::new(0);

        let completion = runner
            .run(&identity(), Level::SubEnv, fields::CREATED, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        assert!(!completion.was_skipped());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            runner
                .store()
                .get(&identity(), Level::SubEnv, fields::CREATED)
                .await
                .unwrap(),
            Some(FieldValue::Bool(true))
        );
    }

    #[tokio::test]
    async fn test_soft_conflict_counts_as_success() {
        let temp = TempDir::new().unwrap();
        let runner = runner(&temp).await;
        let key = fields::PRODUCTS_IMPORTED;

        let completion = runner
            .run(&identity(), Level::SubResource, key, || async {
                Err(ExternalError::new("ImportError", "Product already exists").into())
            })
            .await
            .unwrap();

        assert_eq!(completion, Completion::Ran(()));
        assert_eq!(
            runner
                .store()
                .get(&identity(), Level::SubResource, key)
                .await
                .unwrap(),
            Some(FieldValue::Bool(true))
        );
    }

    #[tokio::test]
    async fn test_false_field_is_not_done() {
        let temp = TempDir::new().unwrap();
        let runner = runner(&temp).await;
        runner
            .store()
            .set(&identity(), Level::SubResource, fields::DONE, false)
            .await
            .unwrap();

        let completion = runner
            .run(
                &identity(),
                Level::SubResource,
                fields::DONE,
                || async { Ok(()) },
            )
            .await
            .unwrap();
        assert!(!completion.was_skipped());
    }

    #[tokio::test]
    async fn test_run_recorded_returns_cached_value() {
        let temp = TempDir::new().unwrap();
        let runner = runner(&temp).await;
        let calls = AtomicU32::new(0);
        let make_user = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(UserInfo {
                id: "005xx".into(),
                username: "buyer@storeA.example".into(),
                ..Default::default()
            })
        };

        let first = runner
            .run_recorded(
                &identity(),
                Level::SubResource,
                fields::USER_INFO,
                make_user,
            )
            .await
            .unwrap();
        let second = runner
            .run_recorded(
                &identity(),
                Level::SubResource,
                fields::USER_INFO,
                make_user,
            )
            .await
            .unwrap();

        assert!(!first.was_skipped());
        assert!(second.was_skipped());
        assert_eq!(first.into_inner(), second.into_inner());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_recorded_string_result() {
        let temp = TempDir::new().unwrap();
        let runner = runner(&temp).await;

        let id = runner
            .run_recorded(&identity(), Level::SubResource, fields::ID, || async {
                Ok("0ZExx0000001".to_string())
            })
            .await
            .unwrap()
            .into_inner();

        assert_eq!(
            runner
                .store()
                .get(&identity(), Level::SubResource, fields::ID)
                .await
                .unwrap(),
            Some(FieldValue::Text(id))
        );
    }

    #[tokio::test]
    async fn test_run_with_retry_records_exhausted_failure() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::open_at(temp.path().join("status.yaml"))
            .await
            .unwrap();
        let runner = StageRunner::with_driver(store, RetryDriver::new(RetryPolicy::default()));
        let command = ScriptedCommand::always_failing(ExternalError::new("Unknown", "boom"));

        let error = runner
            .run_with_retry(&identity(), Level::SubEnv, fields::CREATED, &command)
            .await
            .unwrap_err();

        assert_eq!(command.calls(), 4);
        let recorded = runner
            .store()
            .get(&identity(), Level::SubEnv, fields::CREATED)
            .await
            .unwrap()
            .unwrap();
        let record = recorded.as_error().unwrap();
        assert_eq!(record.code, error.code());
        assert_eq!(record.attempts, Some(4));
    }

    #[tokio::test]
    async fn test_run_with_retry_null_result_stores_true() {
        let temp = TempDir::new().unwrap();
        let runner = runner(&temp).await;
        let command = ScriptedCommand::succeeding(serde_json::Value::Null);

        let completion = runner
            .run_with_retry(&identity(), Level::Hub, fields::ENABLED, &command)
            .await
            .unwrap();
        assert_eq!(completion, Completion::Ran(serde_json::json!(true)));

        let again = runner
            .run_with_retry(&identity(), Level::Hub, fields::ENABLED, &command)
            .await
            .unwrap();
        assert!(again.was_skipped());
        assert_eq!(command.calls(), 1);
    }
}
