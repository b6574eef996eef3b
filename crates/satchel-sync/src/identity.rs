//! Device identity: issue and persist the per-installation identifier.

use std::sync::Arc;

use satchel_core::effects::KeyValueEffects;
use satchel_core::{DeviceId, Result};
use tokio::sync::Mutex;

/// Storage key holding the persisted device identifier.
pub const DEVICE_IDENTITY_KEY: &str = "device/identity";

/// Issues the stable per-installation device identifier.
///
/// The identifier is created once, on first access, persisted under
/// [`DEVICE_IDENTITY_KEY`], and immutable thereafter. It is only discarded
/// by [`reset`](Self::reset) (the app-reset flow).
///
/// First access is serialized: the whole read-generate-persist section runs
/// under one async mutex, so concurrent first calls cannot each persist a
/// different identifier. Later calls are answered from the in-process cache.
pub struct DeviceIdentityProvider {
    storage: Arc<dyn KeyValueEffects>,
    resolved: Mutex<Option<DeviceId>>,
}

impl DeviceIdentityProvider {
    /// Create a provider over the given storage backend.
    pub fn new(storage: Arc<dyn KeyValueEffects>) -> Self {
        Self {
            storage,
            resolved: Mutex::new(None),
        }
    }

    /// Return the device identifier, creating and persisting it on first
    /// access.
    ///
    /// Storage failures surface as [`SyncError::StorageUnavailable`]
    /// (satchel_core::SyncError) and leave nothing cached; the caller may
    /// retry.
    pub async fn get_or_create(&self) -> Result<DeviceId> {
        let mut resolved = self.resolved.lock().await;
        if let Some(id) = resolved.as_ref() {
            return Ok(id.clone());
        }

        let id = match self.storage.get(DEVICE_IDENTITY_KEY).await? {
            Some(raw) => DeviceId::new(raw),
            None => {
                let id = DeviceId::generate();
                self.storage
                    .put(DEVICE_IDENTITY_KEY, id.as_str().to_owned())
                    .await?;
                tracing::info!(device_id = %id, "generated device identity");
                id
            }
        };

        *resolved = Some(id.clone());
        Ok(id)
    }

    /// Discard the persisted identifier (app-reset flow). The next
    /// [`get_or_create`](Self::get_or_create) call issues a fresh one.
    pub async fn reset(&self) -> Result<()> {
        let mut resolved = self.resolved.lock().await;
        self.storage.remove(DEVICE_IDENTITY_KEY).await?;
        *resolved = None;
        tracing::info!("device identity cleared");
        Ok(())
    }
}
