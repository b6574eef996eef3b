//! Remote profile observable bridge.
//!
//! A narrow channel, independent of the snapshot pipeline: one small profile
//! record mirrored against a remote get/set endpoint with a local
//! persistence cache. Reads resolve from the cache immediately; writes
//! update the cache synchronously and propagate to the remote
//! asynchronously; refreshes merge remote state in with field-level
//! last-write-wins. None of this goes through the codec or the snapshot's
//! all-or-nothing contract.

use std::sync::Arc;

use chrono::Utc;
use satchel_core::effects::{KeyValueEffects, ProfileEndpoint};
use satchel_core::{Dynamic, ProfileRecord, Result, Subscription, SyncError};

/// Storage key holding the locally cached profile record.
pub const PROFILE_STORAGE_KEY: &str = "profile/record";

/// Bidirectional mirror of the profile record.
pub struct RemoteProfileBridge {
    storage: Arc<dyn KeyValueEffects>,
    endpoint: Arc<dyn ProfileEndpoint>,
    cache: Dynamic<ProfileRecord>,
}

impl RemoteProfileBridge {
    /// Create the bridge, hydrating the cache from local storage.
    ///
    /// A missing or undecodable cached record degrades to an empty one; the
    /// next refresh or write repopulates it.
    pub async fn load(
        storage: Arc<dyn KeyValueEffects>,
        endpoint: Arc<dyn ProfileEndpoint>,
    ) -> Result<Self> {
        let cached = match storage.get(PROFILE_STORAGE_KEY).await? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "cached profile record undecodable, starting empty");
                ProfileRecord::default()
            }),
            None => ProfileRecord::default(),
        };
        Ok(Self {
            storage,
            endpoint,
            cache: Dynamic::new(cached),
        })
    }

    /// The current cached record.
    pub fn record(&self) -> ProfileRecord {
        self.cache.get()
    }

    /// Read one field from the cache.
    pub fn get(&self, field: &str) -> Option<serde_json::Value> {
        self.cache.get().get(field).cloned()
    }

    /// Observe cache changes.
    pub fn subscribe(&self) -> Subscription<ProfileRecord> {
        self.cache.subscribe()
    }

    /// Write one field.
    ///
    /// The cache is updated synchronously and persisted locally before the
    /// call returns; remote propagation runs in the background and is
    /// best-effort, with the next write or refresh reconciling any miss.
    pub async fn set_field(&self, field: &str, value: serde_json::Value) -> Result<()> {
        let mut record = self.cache.get();
        record.set(field, value, Utc::now());
        self.cache.set(record.clone());
        self.persist(&record).await?;

        let endpoint = Arc::clone(&self.endpoint);
        tokio::spawn(async move {
            if let Err(err) = endpoint.set_profile(record).await {
                tracing::warn!(error = %err, "profile propagation deferred to next write");
            }
        });
        Ok(())
    }

    /// Push the full cached record to the remote, synchronously.
    pub async fn flush(&self) -> Result<()> {
        self.endpoint
            .set_profile(self.cache.get())
            .await
            .map_err(SyncError::from)
    }

    /// Fetch the remote record and merge it into the cache, field-level
    /// last-write-wins. Returns whether the cache changed.
    pub async fn refresh(&self) -> Result<bool> {
        let Some(remote) = self
            .endpoint
            .get_profile()
            .await
            .map_err(SyncError::from)?
        else {
            return Ok(false);
        };

        let mut merged = self.cache.get();
        if !merged.merge(&remote) {
            return Ok(false);
        }
        self.cache.set(merged.clone());
        self.persist(&merged).await?;
        Ok(true)
    }

    async fn persist(&self, record: &ProfileRecord) -> Result<()> {
        let encoded = serde_json::to_string(record)?;
        self.storage
            .put(PROFILE_STORAGE_KEY, encoded)
            .await
            .map_err(SyncError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use satchel_testkit::{MemoryKeyValueStore, MemoryProfileEndpoint};

    async fn bridge() -> (
        RemoteProfileBridge,
        Arc<MemoryKeyValueStore>,
        Arc<MemoryProfileEndpoint>,
    ) {
        let storage = Arc::new(MemoryKeyValueStore::new());
        let endpoint = Arc::new(MemoryProfileEndpoint::new());
        let bridge = RemoteProfileBridge::load(storage.clone(), endpoint.clone())
            .await
            .unwrap();
        (bridge, storage, endpoint)
    }

    #[tokio::test]
    async fn writes_are_visible_locally_before_propagation() {
        let (bridge, storage, _) = bridge().await;

        bridge
            .set_field("display_name", serde_json::json!("Ada"))
            .await
            .unwrap();

        assert_eq!(bridge.get("display_name"), Some(serde_json::json!("Ada")));
        // Local persistence happened synchronously.
        let cached = storage.get(PROFILE_STORAGE_KEY).await.unwrap().unwrap();
        let record: ProfileRecord = serde_json::from_str(&cached).unwrap();
        assert_eq!(record.get("display_name"), Some(&serde_json::json!("Ada")));
    }

    #[tokio::test]
    async fn flush_propagates_the_cached_record() {
        let (bridge, _, endpoint) = bridge().await;

        bridge
            .set_field("timezone", serde_json::json!("UTC"))
            .await
            .unwrap();
        bridge.flush().await.unwrap();

        let remote = endpoint.latest().unwrap();
        assert_eq!(remote.get("timezone"), Some(&serde_json::json!("UTC")));
    }

    #[tokio::test]
    async fn refresh_merges_field_level_last_write_wins() {
        let (bridge, _, endpoint) = bridge().await;

        bridge
            .set_field("display_name", serde_json::json!("local"))
            .await
            .unwrap();

        // Remote has a newer avatar but an older display name.
        let mut remote = ProfileRecord::default();
        remote.set(
            "display_name",
            serde_json::json!("stale"),
            Utc::now() - Duration::hours(1),
        );
        remote.set("avatar", serde_json::json!("a.png"), Utc::now());
        endpoint.seed(remote);

        let changed = bridge.refresh().await.unwrap();
        assert!(changed);
        assert_eq!(bridge.get("display_name"), Some(serde_json::json!("local")));
        assert_eq!(bridge.get("avatar"), Some(serde_json::json!("a.png")));
    }

    #[tokio::test]
    async fn refresh_without_remote_record_changes_nothing() {
        let (bridge, _, _) = bridge().await;
        assert!(!bridge.refresh().await.unwrap());
        assert_eq!(bridge.record(), ProfileRecord::default());
    }

    #[tokio::test]
    async fn cache_survives_reload_from_storage() {
        let storage = Arc::new(MemoryKeyValueStore::new());
        let endpoint = Arc::new(MemoryProfileEndpoint::new());
        {
            let bridge = RemoteProfileBridge::load(storage.clone(), endpoint.clone())
                .await
                .unwrap();
            bridge
                .set_field("display_name", serde_json::json!("Ada"))
                .await
                .unwrap();
        }

        let reloaded = RemoteProfileBridge::load(storage, endpoint).await.unwrap();
        assert_eq!(
            reloaded.get("display_name"),
            Some(serde_json::json!("Ada"))
        );
    }

    #[tokio::test]
    async fn undecodable_cached_record_degrades_to_empty() {
        let storage = Arc::new(MemoryKeyValueStore::new());
        storage
            .put(PROFILE_STORAGE_KEY, "not json at all".to_owned())
            .await
            .unwrap();

        let bridge =
            RemoteProfileBridge::load(storage, Arc::new(MemoryProfileEndpoint::new()))
                .await
                .unwrap();
        assert_eq!(bridge.record(), ProfileRecord::default());
    }

    #[tokio::test]
    async fn subscription_observes_writes() {
        let (bridge, _, _) = bridge().await;
        let mut sub = bridge.subscribe();

        bridge
            .set_field("display_name", serde_json::json!("Ada"))
            .await
            .unwrap();

        let seen = sub.poll().expect("cache changed");
        assert_eq!(seen.get("display_name"), Some(&serde_json::json!("Ada")));
    }
}
