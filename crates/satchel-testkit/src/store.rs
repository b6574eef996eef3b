//! Controllable in-memory feature store fixture.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use satchel_core::{Dynamic, StateStore, StoreError};

/// An in-memory feature store with an observable hydration flag.
///
/// Serializes to a JSON object and rejects anything else on validate, which
/// is how tests exercise the snapshot pipeline's all-or-nothing apply.
pub struct MemoryStateStore {
    name: String,
    state: RwLock<serde_json::Value>,
    hydrated: Dynamic<bool>,
    import_count: AtomicUsize,
}

impl MemoryStateStore {
    /// Create a store that reports hydrated immediately.
    pub fn new(name: impl Into<String>, initial: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(initial),
            hydrated: Dynamic::new(true),
            import_count: AtomicUsize::new(0),
        }
    }

    /// Create a store that has not hydrated yet.
    pub fn unhydrated(name: impl Into<String>, initial: serde_json::Value) -> Self {
        let store = Self::new(name, initial);
        store.hydrated.set(false);
        store
    }

    /// The store's current state.
    pub fn state(&self) -> serde_json::Value {
        self.state.read().clone()
    }

    /// Replace the state directly, as the feature's own business logic
    /// would.
    pub fn replace_state(&self, state: serde_json::Value) {
        *self.state.write() = state;
    }

    /// How many imports have been applied.
    pub fn import_count(&self) -> usize {
        self.import_count.load(Ordering::SeqCst)
    }

    /// The hydration flag, for wiring into a gate.
    pub fn hydration_flag(&self) -> Dynamic<bool> {
        self.hydrated.clone()
    }

    /// Flip the hydration flag.
    pub fn set_hydrated(&self, hydrated: bool) {
        self.hydrated.set(hydrated);
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export_state(&self) -> Result<serde_json::Value, StoreError> {
        Ok(self.state.read().clone())
    }

    fn validate_state(&self, state: &serde_json::Value) -> Result<(), StoreError> {
        if state.is_object() {
            Ok(())
        } else {
            Err(StoreError::invalid_state("expected a JSON object"))
        }
    }

    async fn import_state(&self, state: serde_json::Value) -> Result<(), StoreError> {
        self.validate_state(&state)?;
        *self.state.write() = state;
        self.import_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn import_replaces_state_wholesale() {
        let store = MemoryStateStore::new("items", serde_json::json!({"items": [1]}));
        store
            .import_state(serde_json::json!({"items": [2, 3]}))
            .await
            .unwrap();
        assert_eq!(store.state(), serde_json::json!({"items": [2, 3]}));
        assert_eq!(store.import_count(), 1);
    }

    #[tokio::test]
    async fn non_object_states_fail_validation() {
        let store = MemoryStateStore::new("items", serde_json::json!({}));
        assert!(store.validate_state(&serde_json::json!("scalar")).is_err());
        assert!(store
            .import_state(serde_json::json!([1, 2]))
            .await
            .is_err());
        assert_eq!(store.import_count(), 0);
    }

    #[test]
    fn hydration_flag_is_shared() {
        let store = MemoryStateStore::unhydrated("items", serde_json::json!({}));
        let flag = store.hydration_flag();
        assert!(!flag.get());
        store.set_hydrated(true);
        assert!(flag.get());
    }
}
