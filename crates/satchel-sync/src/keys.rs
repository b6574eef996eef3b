//! Sync key management: the long-lived symmetric key behind the snapshot
//! cipher.
//!
//! A random 32-byte root is generated lazily on first sync attempt and
//! persisted keyed by device identity; the cipher key handed to the codec is
//! HKDF-derived from that root. Key material never leaves this module except
//! inside [`SyncKey`], which only the codec/transport boundary can open, and
//! it must never be logged (the sync log independently redacts key-like
//! payloads).
//!
//! Loss of the persisted root is unrecoverable for previously pushed
//! snapshots. It surfaces as [`SyncError::KeyLost`] and is escalated as a
//! user-visible data-recovery event, never silently retried.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use satchel_core::effects::KeyValueEffects;
use satchel_core::{DeviceId, Result, SyncError};
use sha2::Sha256;
use tokio::sync::Mutex;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Storage key prefix for persisted root key material.
pub const SYNC_KEY_PREFIX: &str = "sync/key/";

const KEY_LEN: usize = 32;

/// HKDF info binding derived keys to this subsystem and schema line. Kept
/// independent of device identity so root material provisioned to another
/// installation of the same account derives the same cipher key.
const DERIVE_INFO: &str = "satchel-sync-dek-v1";

/// The symmetric key used to seal and open state snapshots.
///
/// Scoped to one device identity. The raw bytes are reachable only inside
/// this crate and are zeroized when the key is dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SyncKey {
    #[zeroize(skip)]
    device_id: DeviceId,
    key: [u8; KEY_LEN],
}

impl SyncKey {
    /// Device identity this key is scoped to.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Raw cipher key bytes, visible to the codec only.
    pub(crate) fn cipher_key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl std::fmt::Debug for SyncKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of Debug output.
        f.debug_struct("SyncKey")
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

/// Creates and returns the device-scoped sync key.
///
/// First use generates and persists the root; subsequent calls derive the
/// same cipher key from the persisted material. Creation is serialized under
/// an async mutex the same way first-access of the device identity is.
pub struct SyncKeyManager {
    storage: Arc<dyn KeyValueEffects>,
    creation: Mutex<()>,
}

impl SyncKeyManager {
    /// Create a manager over the given storage backend.
    pub fn new(storage: Arc<dyn KeyValueEffects>) -> Self {
        Self {
            storage,
            creation: Mutex::new(()),
        }
    }

    /// Return the sync key for `device_id`, creating and persisting root
    /// material on first use.
    pub async fn get_or_create(&self, device_id: &DeviceId) -> Result<SyncKey> {
        let _guard = self.creation.lock().await;
        let storage_key = Self::storage_key(device_id);

        let mut root: [u8; KEY_LEN] = match self.storage.get(&storage_key).await? {
            Some(encoded) => {
                let bytes = BASE64.decode(encoded.as_bytes()).map_err(|_| {
                    SyncError::key_lost("persisted key material is not valid base64")
                })?;
                bytes.try_into().map_err(|_| {
                    SyncError::key_lost("persisted key material has the wrong length")
                })?
            }
            None => {
                let mut root = [0u8; KEY_LEN];
                OsRng.fill_bytes(&mut root);
                self.storage.put(&storage_key, BASE64.encode(root)).await?;
                tracing::info!(device_id = %device_id, "generated sync key material");
                root
            }
        };

        let derived = derive_cipher_key(&root);
        root.zeroize();
        Ok(SyncKey {
            device_id: device_id.clone(),
            key: derived?,
        })
    }

    /// Discard the persisted root for `device_id` (app-reset flow).
    ///
    /// Snapshots pushed under the old key become undecryptable; callers own
    /// communicating that to the user before invoking this.
    pub async fn reset(&self, device_id: &DeviceId) -> Result<()> {
        let _guard = self.creation.lock().await;
        self.storage.remove(&Self::storage_key(device_id)).await?;
        tracing::info!(device_id = %device_id, "sync key material cleared");
        Ok(())
    }

    fn storage_key(device_id: &DeviceId) -> String {
        format!("{SYNC_KEY_PREFIX}{device_id}")
    }
}

fn derive_cipher_key(root: &[u8; KEY_LEN]) -> Result<[u8; KEY_LEN]> {
    let hkdf = Hkdf::<Sha256>::new(None, root);
    let mut okm = [0u8; KEY_LEN];
    hkdf.expand(DERIVE_INFO.as_bytes(), &mut okm)
        .map_err(|_| SyncError::key_lost("cipher key derivation failed"))?;
    Ok(okm)
}
