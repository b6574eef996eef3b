//! Snapshot transport: push to and pull from the remote holder.
//!
//! Push resolves device identity and sync key, asks the codec for a fresh
//! encrypted snapshot, and overwrites the single remote record (last write
//! wins). Pull fetches the current record, verifies its checksum, and hands
//! it to the codec to decrypt and apply. "No remote record yet" is a clean
//! outcome, distinct from every failure in the taxonomy.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use satchel_core::effects::SnapshotEndpoint;
use satchel_core::types::sha256_checksum;
use satchel_core::{LogLevel, RemoteSnapshotRecord, Result, StateStore, SyncError};

use crate::codec::SnapshotCodec;
use crate::identity::DeviceIdentityProvider;
use crate::keys::SyncKeyManager;
use crate::log::SyncLog;

/// Result of a pull attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// No device has pushed a snapshot yet
    NoRemote,
    /// A snapshot was applied to the named stores
    Applied(Vec<String>),
}

/// Pushes and pulls the encrypted snapshot record.
pub struct SnapshotTransport {
    identity: Arc<DeviceIdentityProvider>,
    keys: Arc<SyncKeyManager>,
    codec: SnapshotCodec,
    endpoint: Arc<dyn SnapshotEndpoint>,
    stores: Vec<Arc<dyn StateStore>>,
    log: SyncLog,
}

impl SnapshotTransport {
    /// Assemble a transport over the given collaborators.
    pub fn new(
        identity: Arc<DeviceIdentityProvider>,
        keys: Arc<SyncKeyManager>,
        codec: SnapshotCodec,
        endpoint: Arc<dyn SnapshotEndpoint>,
        stores: Vec<Arc<dyn StateStore>>,
        log: SyncLog,
    ) -> Self {
        Self {
            identity,
            keys,
            codec,
            endpoint,
            stores,
            log,
        }
    }

    /// The stores this transport exports from and imports into.
    pub fn stores(&self) -> &[Arc<dyn StateStore>] {
        &self.stores
    }

    /// Export, encrypt, and upload a fresh snapshot, overwriting the remote
    /// record.
    ///
    /// Safe to retry: unchanged local state produces an equivalent record.
    pub async fn push_snapshot(&self) -> Result<()> {
        let device_id = self.identity.get_or_create().await?;
        let key = self.keys.get_or_create(&device_id).await?;

        let mut states = BTreeMap::new();
        for store in &self.stores {
            let state = store.export_state().await.map_err(|e| {
                SyncError::invalid_snapshot(format!("store {}: {e}", store.name()))
            })?;
            states.insert(store.name().to_owned(), state);
        }
        let store_count = states.len();

        let encrypted = self.codec.export_encrypted(&key, states).await?;
        let size = encrypted.bytes.len();
        let record = RemoteSnapshotRecord {
            device_id,
            encrypted_payload: encrypted.bytes,
            checksum: encrypted.checksum,
            updated_at: Utc::now(),
        };

        let upload = self.endpoint.put_latest(record).await;
        // The staged ciphertext only exists for the upload; a retry
        // re-exports fresh state.
        let _ = tokio::fs::remove_file(&encrypted.path).await;
        upload.map_err(SyncError::from)?;

        self.log.add(
            format!("pushed snapshot covering {store_count} stores ({size} bytes)"),
            LogLevel::Info,
        );
        Ok(())
    }

    /// Download the current remote record, decrypt it, and apply it to the
    /// local stores.
    ///
    /// Re-applying an unchanged record is a no-op by store-import
    /// idempotence.
    pub async fn pull_latest(&self) -> Result<PullOutcome> {
        let device_id = self.identity.get_or_create().await?;
        let key = self.keys.get_or_create(&device_id).await?;

        let record = match self.endpoint.get_latest().await.map_err(SyncError::from)? {
            Some(record) => record,
            None => {
                self.log
                    .add("no remote snapshot to pull yet", LogLevel::Verbose);
                return Ok(PullOutcome::NoRemote);
            }
        };

        if sha256_checksum(&record.encrypted_payload) != record.checksum {
            return Err(SyncError::invalid_snapshot(
                "remote record checksum mismatch",
            ));
        }

        let applied = self
            .codec
            .decrypt_and_apply(&key, &record.encrypted_payload, &self.stores)
            .await?;
        self.log.add(
            format!(
                "pulled snapshot from device {} and applied {} stores",
                record.device_id,
                applied.len()
            ),
            LogLevel::Info,
        );
        Ok(PullOutcome::Applied(applied))
    }
}
