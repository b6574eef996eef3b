//! Hydration gate: aggregate per-store readiness into one boolean.
//!
//! Sync must not run against stores that have not finished loading their
//! persisted state. The gate composes the hydration flags of the identity
//! store, the items store, and the habits store; it is a pure read with no
//! lifecycle of its own.

use std::time::Duration;

use satchel_core::Dynamic;

/// Composite readiness over the three independently-persisted stores.
///
/// A store that never reports hydrated (for example over corrupted storage)
/// degrades the gate to never-ready. That is the correct behavior, not a
/// failure: the controller simply never arms.
#[derive(Clone)]
pub struct HydrationGate {
    identity: Dynamic<bool>,
    items: Dynamic<bool>,
    habits: Dynamic<bool>,
}

impl HydrationGate {
    /// Build the gate over the three store hydration flags.
    pub fn new(identity: Dynamic<bool>, items: Dynamic<bool>, habits: Dynamic<bool>) -> Self {
        Self {
            identity,
            items,
            habits,
        }
    }

    /// True only when every dependency store has hydrated.
    pub fn is_complete(&self) -> bool {
        self.identity.get() && self.items.get() && self.habits.get()
    }

    /// Wait until the gate reports complete, polling at `interval`.
    ///
    /// May never return if a store never hydrates; callers own any timeout.
    pub async fn wait_until_complete(&self, interval: Duration) {
        loop {
            if self.is_complete() {
                return;
            }
            tokio::time::sleep(interval).await;
        }
    }
}
