//! Snapshot codec: serialize, encrypt, decrypt, and apply state snapshots.
//!
//! Export wraps the collected store states into one versioned document,
//! encodes it deterministically, seals it with the sync key, and stages the
//! ciphertext in a scoped temporary location for the transport to upload.
//! The wire format is `nonce(12) || ciphertext || tag(16)`.
//!
//! Apply is all-or-nothing at the snapshot boundary: every named store's
//! sub-payload is validated before any store's import runs, so a snapshot
//! with one unparsable sub-payload changes nothing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use chrono::Utc;
use satchel_core::types::sha256_checksum;
use satchel_core::{Result, StateSnapshot, StateStore, SyncError};
use uuid::Uuid;

use crate::keys::SyncKey;

/// Newest snapshot document version this build understands.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// A staged, encrypted snapshot ready for upload.
#[derive(Debug)]
pub struct EncryptedSnapshot {
    /// Scoped temporary file holding the ciphertext
    pub path: PathBuf,
    /// The ciphertext itself, `nonce || ciphertext || tag`
    pub bytes: Vec<u8>,
    /// SHA-256 of `bytes`, hex-encoded
    pub checksum: String,
}

/// Serializes and encrypts snapshots, and applies decrypted ones.
pub struct SnapshotCodec {
    staging_dir: PathBuf,
}

impl SnapshotCodec {
    /// Create a codec staging ciphertext under the platform temp directory.
    pub fn new() -> Self {
        Self::with_staging_dir(std::env::temp_dir().join("satchel-sync"))
    }

    /// Create a codec staging ciphertext under an explicit directory.
    pub fn with_staging_dir(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
        }
    }

    /// Wrap, serialize, encrypt, and stage the given store states.
    ///
    /// The snapshot is keyed to the device identity carried by `key`.
    /// Exporting an empty mapping is refused: a snapshot that covers no
    /// store would overwrite the remote record with nothing.
    pub async fn export_encrypted(
        &self,
        key: &SyncKey,
        states: BTreeMap<String, serde_json::Value>,
    ) -> Result<EncryptedSnapshot> {
        if states.is_empty() {
            return Err(SyncError::invalid_snapshot(
                "refusing to export a snapshot covering no stores",
            ));
        }

        let snapshot = StateSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            created_at: Utc::now(),
            device_id: key.device_id().clone(),
            payload: states,
        };
        let plaintext = serde_json::to_vec(&snapshot)?;
        let bytes = seal(key, &plaintext)?;
        let checksum = sha256_checksum(&bytes);

        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let path = self
            .staging_dir
            .join(format!("snapshot-{}.bin", Uuid::new_v4()));
        tokio::fs::write(&path, &bytes).await?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "staged encrypted snapshot");

        Ok(EncryptedSnapshot {
            path,
            bytes,
            checksum,
        })
    }

    /// Decrypt a remote payload and apply it to the matching stores.
    ///
    /// Returns the names of the stores that were updated. Snapshots written
    /// by a newer build are rejected with local state untouched, as is any
    /// snapshot whose sub-payloads do not all validate.
    pub async fn decrypt_and_apply(
        &self,
        key: &SyncKey,
        payload: &[u8],
        stores: &[Arc<dyn StateStore>],
    ) -> Result<Vec<String>> {
        let plaintext = open(key, payload)?;
        let snapshot: StateSnapshot = serde_json::from_slice(&plaintext)
            .map_err(|e| SyncError::invalid_snapshot(format!("undecodable document: {e}")))?;

        if snapshot.schema_version > SNAPSHOT_SCHEMA_VERSION {
            return Err(SyncError::SchemaVersionMismatch {
                found: snapshot.schema_version,
                supported: SNAPSHOT_SCHEMA_VERSION,
            });
        }

        // Validate every matching sub-payload before touching any store.
        let mut matched: Vec<(&Arc<dyn StateStore>, &serde_json::Value)> = Vec::new();
        for store in stores {
            if let Some(state) = snapshot.payload.get(store.name()) {
                store.validate_state(state).map_err(|e| {
                    SyncError::invalid_snapshot(format!("store {}: {e}", store.name()))
                })?;
                matched.push((store, state));
            }
        }
        for name in snapshot.payload.keys() {
            if !stores.iter().any(|s| s.name() == name) {
                tracing::warn!(store = %name, "snapshot names a store this build does not register");
            }
        }

        let mut applied = Vec::with_capacity(matched.len());
        for (store, state) in matched {
            store.import_state(state.clone()).await.map_err(|e| {
                SyncError::invalid_snapshot(format!("store {}: {e}", store.name()))
            })?;
            applied.push(store.name().to_owned());
        }
        Ok(applied)
    }

    /// Directory ciphertext is staged under.
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }
}

impl Default for SnapshotCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn seal(key: &SyncKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.cipher_key()));
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| SyncError::serialization("snapshot encryption failed"))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

fn open(key: &SyncKey, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(SyncError::decryption_failed("ciphertext too short"));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.cipher_key()));
    cipher.decrypt(Nonce::from_slice(nonce), ciphertext).map_err(|_| {
        SyncError::decryption_failed("authentication failed: wrong or rotated key, or corrupted payload")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SyncKeyManager;
    use proptest::prelude::*;
    use satchel_core::DeviceId;
    use satchel_testkit::{MemoryKeyValueStore, MemoryStateStore};

    async fn test_key(device: &str) -> SyncKey {
        let manager = SyncKeyManager::new(Arc::new(MemoryKeyValueStore::new()));
        manager.get_or_create(&DeviceId::new(device)).await.unwrap()
    }

    fn codec(dir: &tempfile::TempDir) -> SnapshotCodec {
        SnapshotCodec::with_staging_dir(dir.path())
    }

    fn states(pairs: &[(&str, serde_json::Value)]) -> BTreeMap<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), value.clone()))
            .collect()
    }

    #[tokio::test]
    async fn export_then_apply_reproduces_store_states() {
        let dir = tempfile::tempdir().unwrap();
        let key = test_key("device-1").await;
        let exported = states(&[
            ("habits", serde_json::json!({"streak": 4})),
            ("items", serde_json::json!({"items": ["a", "b"]})),
        ]);

        let encrypted = codec(&dir)
            .export_encrypted(&key, exported.clone())
            .await
            .unwrap();

        let habits: Arc<dyn StateStore> =
            Arc::new(MemoryStateStore::new("habits", serde_json::json!({})));
        let items: Arc<dyn StateStore> =
            Arc::new(MemoryStateStore::new("items", serde_json::json!({})));
        let stores = vec![Arc::clone(&habits), Arc::clone(&items)];

        let applied = codec(&dir)
            .decrypt_and_apply(&key, &encrypted.bytes, &stores)
            .await
            .unwrap();
        assert_eq!(applied, ["habits", "items"]);

        // Re-export from the hydrated stores and compare the payloads.
        let mut roundtrip = BTreeMap::new();
        for store in &stores {
            roundtrip.insert(store.name().to_owned(), store.export_state().await.unwrap());
        }
        assert_eq!(roundtrip, exported);
    }

    #[tokio::test]
    async fn staged_file_holds_the_ciphertext() {
        let dir = tempfile::tempdir().unwrap();
        let key = test_key("device-1").await;
        let encrypted = codec(&dir)
            .export_encrypted(&key, states(&[("items", serde_json::json!({"n": 1}))]))
            .await
            .unwrap();

        let on_disk = tokio::fs::read(&encrypted.path).await.unwrap();
        assert_eq!(on_disk, encrypted.bytes);
        assert_eq!(encrypted.checksum, sha256_checksum(&on_disk));
    }

    #[tokio::test]
    async fn empty_export_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let key = test_key("device-1").await;
        let err = codec(&dir)
            .export_encrypted(&key, BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidSnapshot { .. }));
    }

    #[tokio::test]
    async fn wrong_key_fails_decryption_and_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let key = test_key("device-1").await;
        let other_key = test_key("device-2").await;

        let encrypted = codec(&dir)
            .export_encrypted(&key, states(&[("items", serde_json::json!({"n": 1}))]))
            .await
            .unwrap();

        let store = Arc::new(MemoryStateStore::new(
            "items",
            serde_json::json!({"n": 0}),
        ));
        let stores: Vec<Arc<dyn StateStore>> = vec![store.clone()];

        let err = codec(&dir)
            .decrypt_and_apply(&other_key, &encrypted.bytes, &stores)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::DecryptionFailed { .. }));
        assert_eq!(store.state(), serde_json::json!({"n": 0}));
        assert_eq!(store.import_count(), 0);
    }

    #[tokio::test]
    async fn tampered_ciphertext_fails_decryption() {
        let dir = tempfile::tempdir().unwrap();
        let key = test_key("device-1").await;
        let mut encrypted = codec(&dir)
            .export_encrypted(&key, states(&[("items", serde_json::json!({"n": 1}))]))
            .await
            .unwrap();

        let mid = encrypted.bytes.len() / 2;
        encrypted.bytes[mid] ^= 0xff;
        let err = codec(&dir)
            .decrypt_and_apply(&key, &encrypted.bytes, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::DecryptionFailed { .. }));
    }

    #[tokio::test]
    async fn truncated_ciphertext_fails_decryption() {
        let dir = tempfile::tempdir().unwrap();
        let key = test_key("device-1").await;
        let err = codec(&dir)
            .decrypt_and_apply(&key, &[0u8; NONCE_LEN + TAG_LEN - 1], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::DecryptionFailed { .. }));
    }

    #[tokio::test]
    async fn newer_schema_version_is_rejected_before_any_import() {
        let dir = tempfile::tempdir().unwrap();
        let key = test_key("device-1").await;

        let snapshot = StateSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION + 1,
            created_at: Utc::now(),
            device_id: key.device_id().clone(),
            payload: states(&[("items", serde_json::json!({"n": 9}))]),
        };
        let sealed = seal(&key, &serde_json::to_vec(&snapshot).unwrap()).unwrap();

        let store = Arc::new(MemoryStateStore::new(
            "items",
            serde_json::json!({"n": 0}),
        ));
        let stores: Vec<Arc<dyn StateStore>> = vec![store.clone()];

        let err = codec(&dir)
            .decrypt_and_apply(&key, &sealed, &stores)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::SchemaVersionMismatch {
                found,
                supported: SNAPSHOT_SCHEMA_VERSION,
            } if found == SNAPSHOT_SCHEMA_VERSION + 1
        ));
        assert_eq!(store.state(), serde_json::json!({"n": 0}));
    }

    #[tokio::test]
    async fn one_corrupt_sub_payload_fails_the_whole_apply() {
        let dir = tempfile::tempdir().unwrap();
        let key = test_key("device-1").await;

        // "habits" carries a scalar where the store expects an object.
        let snapshot = StateSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            created_at: Utc::now(),
            device_id: key.device_id().clone(),
            payload: states(&[
                ("items", serde_json::json!({"n": 5})),
                ("habits", serde_json::json!("corrupted")),
            ]),
        };
        let sealed = seal(&key, &serde_json::to_vec(&snapshot).unwrap()).unwrap();

        let items = Arc::new(MemoryStateStore::new("items", serde_json::json!({"n": 0})));
        let habits = Arc::new(MemoryStateStore::new("habits", serde_json::json!({})));
        let stores: Vec<Arc<dyn StateStore>> = vec![items.clone(), habits.clone()];

        let err = codec(&dir)
            .decrypt_and_apply(&key, &sealed, &stores)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidSnapshot { .. }));
        // Neither store was touched, including the one with a valid payload.
        assert_eq!(items.state(), serde_json::json!({"n": 0}));
        assert_eq!(items.import_count(), 0);
        assert_eq!(habits.import_count(), 0);
    }

    #[tokio::test]
    async fn unregistered_store_payloads_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let key = test_key("device-1").await;
        let encrypted = codec(&dir)
            .export_encrypted(
                &key,
                states(&[
                    ("items", serde_json::json!({"n": 1})),
                    ("retired", serde_json::json!({"gone": true})),
                ]),
            )
            .await
            .unwrap();

        let items = Arc::new(MemoryStateStore::new("items", serde_json::json!({})));
        let stores: Vec<Arc<dyn StateStore>> = vec![items.clone()];
        let applied = codec(&dir)
            .decrypt_and_apply(&key, &encrypted.bytes, &stores)
            .await
            .unwrap();
        assert_eq!(applied, ["items"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Round-trip law: export then decrypt reproduces the original
        /// payload exactly, for any non-empty store-state mapping.
        #[test]
        fn export_decrypt_roundtrip(
            entries in proptest::collection::btree_map(
                "[a-z]{1,12}",
                proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..4),
                1..6,
            )
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let (decoded, payload) = runtime.block_on(async {
                let dir = tempfile::tempdir().unwrap();
                let key = test_key("prop-device").await;
                let payload: BTreeMap<String, serde_json::Value> = entries
                    .into_iter()
                    .map(|(name, fields)| (name, serde_json::json!(fields)))
                    .collect();

                let encrypted = codec(&dir)
                    .export_encrypted(&key, payload.clone())
                    .await
                    .unwrap();
                let plaintext = open(&key, &encrypted.bytes).unwrap();
                let decoded: StateSnapshot = serde_json::from_slice(&plaintext).unwrap();
                (decoded, payload)
            });

            prop_assert_eq!(decoded.payload, payload);
            prop_assert_eq!(decoded.schema_version, SNAPSHOT_SCHEMA_VERSION);
        }
    }
}
