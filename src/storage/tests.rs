//! Tests for the checkpoint store
use crate::error::ErrorRecord;
use crate::storage::config::StoreConfig;
use crate::storage::error::StorageError;
use crate::storage::lock::{lock_path, LockStrategy};
use crate::storage::store::CheckpointStore;
use crate::storage::types::*;
use std::time::Duration;
use tempfile::TempDir;

fn identity(sub_resource: &str) -> Identity {
    Identity::new("admin@hub.example", "admin@org.example", sub_resource)
}

async fn open_store(temp: &TempDir) -> CheckpointStore {
    CheckpointStore::open_at(temp.path().join("status.yaml"))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_get_on_fresh_store_is_absent() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp).await;

    for level in [Level::Hub, Level::SubEnv, Level::SubResource] {
        assert!(store
            .get(&identity("storeA"), level, fields::CREATED)
            .await
            .unwrap()
            .is_none());
    }
    assert!(!store.path().exists());
}

#[tokio::test]
async fn test_set_then_get_each_level() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp).await;
    let id = identity("storeA");

    store.set(&id, Level::Hub, fields::AUTHED, true).await.unwrap();
    store
        .set(&id, Level::SubEnv, fields::CREATED, "00Dxx")
        .await
        .unwrap();
    store
        .set(&id, Level::SubResource, fields::ID, "0ZExx")
        .await
        .unwrap();

    assert_eq!(
        store.get(&id, Level::Hub, fields::AUTHED).await.unwrap(),
        Some(FieldValue::Bool(true))
    );
    assert_eq!(
        store.get(&id, Level::SubEnv, fields::CREATED).await.unwrap(),
        Some(FieldValue::Text("00Dxx".into()))
    );
    assert_eq!(
        store.get(&id, Level::SubResource, fields::ID).await.unwrap(),
        Some(FieldValue::Text("0ZExx".into()))
    );
    assert!(!lock_path(store.path()).exists());
}

#[tokio::test]
async fn test_document_is_readable_yaml() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp).await;
    store
        .set(&identity("storeA"), Level::SubResource, fields::DONE, true)
        .await
        .unwrap();

    let content = std::fs::read_to_string(store.path()).unwrap();
    assert!(content.contains("hubs:"));
    assert!(content.contains("sub_envs:"));
    assert!(content.contains("sub_resources:"));
    assert!(content.contains("done: true"));
}

#[tokio::test]
async fn test_overwrite_replaces_only_target_field() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp).await;
    let id = identity("storeA");

    store
        .set(&id, Level::SubResource, fields::DONE, false)
        .await
        .unwrap();
    store
        .set(&id, Level::SubResource, fields::PUSHED_SOURCES, true)
        .await
        .unwrap();
    store
        .set(&id, Level::SubResource, fields::DONE, true)
        .await
        .unwrap();

    let doc = store.snapshot().await.unwrap();
    let record = &doc.hubs[&id.hub].sub_envs[&id.sub_env].sub_resources["storeA"];
    assert_eq!(record.fields.len(), 2);
    assert_eq!(record.fields[fields::DONE], FieldValue::Bool(true));
}

#[tokio::test]
async fn test_error_payload_is_stored_verbatim() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp).await;
    let id = identity("storeA");
    let record = ErrorRecord::from_display("PermanentError", "community publish failed");

    store
        .set(
            &id,
            Level::SubResource,
            fields::COMMUNITY_PUBLISHED,
            record.clone(),
        )
        .await
        .unwrap();

    let value = store
        .get(&id, Level::SubResource, fields::COMMUNITY_PUBLISHED)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(value.as_error(), Some(&record));
    assert!(!value.is_done());
}

#[tokio::test]
async fn test_touch_creates_hub_record() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp).await;

    store
        .touch(&Identity::hub("admin@hub.example"), Level::Hub)
        .await
        .unwrap();

    let doc = store.snapshot().await.unwrap();
    assert!(doc.hubs["admin@hub.example"].fields.is_empty());
    assert!(doc.hubs["admin@hub.example"].sub_envs.is_empty());
}

#[tokio::test]
async fn test_invalid_key_leaves_document_untouched() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp).await;
    let id = identity("storeA");
    store.set(&id, Level::Hub, fields::CREATED, true).await.unwrap();
    let before = std::fs::read_to_string(store.path()).unwrap();

    let err = store
        .set(&id, Level::Hub, SUB_ENVS_KEY, true)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidKey(_)));
    let err = store.set(&id, Level::SubEnv, "", true).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidKey(_)));

    assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
}

#[tokio::test]
async fn test_corrupt_document_is_not_replaced() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp).await;
    std::fs::write(store.path(), "hubs: [not, a, map").unwrap();

    let err = store
        .set(&identity("storeA"), Level::Hub, fields::CREATED, true)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Serialization { path: Some(_), .. }));
    assert_eq!(
        std::fs::read_to_string(store.path()).unwrap(),
        "hubs: [not, a, map"
    );
    assert!(!lock_path(store.path()).exists());
}

#[tokio::test]
async fn test_reset_removes_file() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp).await;
    store
        .set(&identity("storeA"), Level::Hub, fields::CREATED, true)
        .await
        .unwrap();

    assert!(store.reset().await.unwrap());
    assert!(!store.path().exists());
    assert!(!store.reset().await.unwrap());
    assert!(store
        .get(&identity("storeA"), Level::Hub, fields::CREATED)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_open_creates_parent_directory() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("dir").join("status.yaml");
    let store = CheckpointStore::open_at(&path).await.unwrap();

    store
        .set(&identity("storeA"), Level::Hub, fields::CREATED, true)
        .await
        .unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn test_open_keeps_stale_lock_when_disabled() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("status.yaml");
    std::fs::write(lock_path(&path), b"").unwrap();

    let config = StoreConfig {
        clear_stale_lock: false,
        ..StoreConfig::at(&path)
    };
    let store = CheckpointStore::open(&config).await.unwrap();
    assert!(lock_path(&path).exists());

    let pending = tokio::time::timeout(
        Duration::from_millis(300),
        store.get(&identity("storeA"), Level::Hub, fields::CREATED),
    )
    .await;
    assert!(pending.is_err(), "get should wait while the marker exists");
}

#[tokio::test]
async fn test_flock_strategy_round_trip() {
    let temp = TempDir::new().unwrap();
    let config = StoreConfig {
        lock_strategy: LockStrategy::Flock,
        ..StoreConfig::at(temp.path().join("status.yaml"))
    };
    let store = CheckpointStore::open(&config).await.unwrap();
    let id = identity("storeA");

    store
        .set(&id, Level::SubResource, fields::INDEX_CREATED, true)
        .await
        .unwrap();
    assert_eq!(
        store
            .get(&id, Level::SubResource, fields::INDEX_CREATED)
            .await
            .unwrap(),
        Some(FieldValue::Bool(true))
    );
}
