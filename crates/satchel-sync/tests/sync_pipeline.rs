//! End-to-end tests of the snapshot pipeline: identity, keys, codec, and
//! transport wired together over in-memory effect handlers, the way two
//! installations of the app would share one remote record.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use satchel_core::effects::KeyValueEffects;
use satchel_core::{StateStore, SyncError};
use satchel_sync::keys::SYNC_KEY_PREFIX;
use satchel_sync::{
    DeviceIdentityProvider, PullOutcome, SnapshotCodec, SnapshotTransport, SyncKeyManager, SyncLog,
};
use satchel_testkit::{MemoryKeyValueStore, MemorySnapshotEndpoint, MemoryStateStore};

struct Installation {
    storage: Arc<MemoryKeyValueStore>,
    identity: Arc<DeviceIdentityProvider>,
    transport: SnapshotTransport,
    items: Arc<MemoryStateStore>,
    habits: Arc<MemoryStateStore>,
}

fn installation(endpoint: Arc<MemorySnapshotEndpoint>, staging: &tempfile::TempDir) -> Installation {
    let storage = Arc::new(MemoryKeyValueStore::new());
    let identity = Arc::new(DeviceIdentityProvider::new(storage.clone()));
    let items = Arc::new(MemoryStateStore::new(
        "items",
        serde_json::json!({"items": []}),
    ));
    let habits = Arc::new(MemoryStateStore::new(
        "habits",
        serde_json::json!({"streaks": {}}),
    ));
    let stores: Vec<Arc<dyn StateStore>> = vec![items.clone(), habits.clone()];
    let transport = SnapshotTransport::new(
        identity.clone(),
        Arc::new(SyncKeyManager::new(storage.clone())),
        SnapshotCodec::with_staging_dir(staging.path()),
        endpoint,
        stores,
        SyncLog::new(),
    );
    Installation {
        storage,
        identity,
        transport,
        items,
        habits,
    }
}

/// Copy installation A's root key material to installation B, the way an
/// account restore provisions a second device.
async fn share_key_material(from: &Installation, to: &Installation) {
    let from_device = from.identity.get_or_create().await.unwrap();
    let to_device = to.identity.get_or_create().await.unwrap();
    let root = from
        .storage
        .get(&format!("{SYNC_KEY_PREFIX}{from_device}"))
        .await
        .unwrap()
        .unwrap();
    to.storage
        .put(&format!("{SYNC_KEY_PREFIX}{to_device}"), root)
        .await
        .unwrap();
}

#[tokio::test]
async fn pull_replaces_local_state_wholesale() {
    let endpoint = Arc::new(MemorySnapshotEndpoint::new());
    let staging = tempfile::tempdir().unwrap();
    let device_a = installation(endpoint.clone(), &staging);
    let device_b = installation(endpoint.clone(), &staging);

    // Device A pushes {items: [A, B]} ...
    device_a
        .items
        .replace_state(serde_json::json!({"items": ["A", "B"]}));
    device_a.transport.push_snapshot().await.unwrap();

    // ... then the remote is overwritten by device B with {items: [A, B, C]}.
    share_key_material(&device_a, &device_b).await;
    device_b
        .items
        .replace_state(serde_json::json!({"items": ["A", "B", "C"]}));
    device_b.transport.push_snapshot().await.unwrap();

    // Device A pulls: local state is exactly the remote's, not a merge.
    let outcome = device_a.transport.pull_latest().await.unwrap();
    assert!(matches!(outcome, PullOutcome::Applied(_)));
    assert_eq!(
        device_a.items.state(),
        serde_json::json!({"items": ["A", "B", "C"]})
    );
}

#[tokio::test]
async fn pull_twice_with_unchanged_remote_is_an_idempotent_reapply() {
    let endpoint = Arc::new(MemorySnapshotEndpoint::new());
    let staging = tempfile::tempdir().unwrap();
    let device = installation(endpoint, &staging);

    device
        .items
        .replace_state(serde_json::json!({"items": ["A"]}));
    device.transport.push_snapshot().await.unwrap();

    device.transport.pull_latest().await.unwrap();
    let after_first = device.items.state();
    device.transport.pull_latest().await.unwrap();

    assert_eq!(device.items.state(), after_first);
    assert_eq!(device.items.import_count(), 2);
}

#[tokio::test]
async fn ciphertext_from_a_different_key_fails_without_touching_stores() {
    let endpoint = Arc::new(MemorySnapshotEndpoint::new());
    let staging = tempfile::tempdir().unwrap();
    let device_a = installation(endpoint.clone(), &staging);
    let device_b = installation(endpoint.clone(), &staging);

    device_a
        .items
        .replace_state(serde_json::json!({"items": ["secret"]}));
    device_a.transport.push_snapshot().await.unwrap();

    // Device B never received A's key material; its own random key cannot
    // authenticate A's ciphertext.
    let before = device_b.items.state();
    let err = device_b.transport.pull_latest().await.unwrap_err();
    assert!(matches!(err, SyncError::DecryptionFailed { .. }));
    assert_eq!(device_b.items.state(), before);
    assert_eq!(device_b.items.import_count(), 0);
    assert_eq!(device_b.habits.import_count(), 0);
}

#[tokio::test]
async fn snapshot_covers_every_registered_store() {
    let endpoint = Arc::new(MemorySnapshotEndpoint::new());
    let staging = tempfile::tempdir().unwrap();
    let device_a = installation(endpoint.clone(), &staging);
    let device_b = installation(endpoint.clone(), &staging);

    device_a
        .items
        .replace_state(serde_json::json!({"items": ["x"]}));
    device_a
        .habits
        .replace_state(serde_json::json!({"streaks": {"water": 3}}));
    device_a.transport.push_snapshot().await.unwrap();

    share_key_material(&device_a, &device_b).await;
    let outcome = device_b.transport.pull_latest().await.unwrap();
    assert_eq!(
        outcome,
        PullOutcome::Applied(vec!["items".to_owned(), "habits".to_owned()])
    );
    assert_eq!(device_b.items.state(), device_a.items.state());
    assert_eq!(device_b.habits.state(), device_a.habits.state());
}

#[tokio::test]
async fn remote_record_carries_writer_identity_and_checksum() {
    let endpoint = Arc::new(MemorySnapshotEndpoint::new());
    let staging = tempfile::tempdir().unwrap();
    let device = installation(endpoint.clone(), &staging);

    device.transport.push_snapshot().await.unwrap();
    let record = endpoint.latest().unwrap();
    let device_id = device.identity.get_or_create().await.unwrap();

    assert_eq!(record.device_id, device_id);
    assert_eq!(
        record.checksum,
        satchel_core::types::sha256_checksum(&record.encrypted_payload)
    );
}

#[tokio::test]
async fn network_failure_loses_no_local_state_and_retry_succeeds() {
    let endpoint = Arc::new(MemorySnapshotEndpoint::new());
    let staging = tempfile::tempdir().unwrap();
    let device = installation(endpoint.clone(), &staging);

    device
        .items
        .replace_state(serde_json::json!({"items": ["kept"]}));
    endpoint.fail_next_with_unavailable("socket closed");
    let err = device.transport.push_snapshot().await.unwrap_err();
    assert!(matches!(err, SyncError::NetworkUnavailable { .. }));
    assert!(endpoint.latest().is_none());

    // The next trigger simply retries; nothing was lost locally.
    device.transport.push_snapshot().await.unwrap();
    assert!(endpoint.latest().is_some());
    assert_eq!(
        device.items.state(),
        serde_json::json!({"items": ["kept"]})
    );
}
