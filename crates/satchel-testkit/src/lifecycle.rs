//! Manually driven application lifecycle source for testing.

use satchel_core::effects::{AppState, LifecycleEvents, LifecycleHandle};
use tokio::sync::broadcast;

/// A lifecycle publisher tests drive by hand.
pub struct ManualLifecycle {
    sender: broadcast::Sender<AppState>,
}

impl ManualLifecycle {
    /// Create a publisher with no listeners yet.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }

    /// Publish a transition. Returns the number of listeners that will see
    /// it; zero when no listener is attached.
    pub fn emit(&self, state: AppState) -> usize {
        self.sender.send(state).unwrap_or(0)
    }

    /// Number of currently attached listeners.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ManualLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleEvents for ManualLifecycle {
    fn subscribe(&self) -> LifecycleHandle {
        LifecycleHandle::new(self.sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitted_states_reach_subscribers() {
        let lifecycle = ManualLifecycle::new();
        let mut handle = lifecycle.subscribe();
        assert_eq!(lifecycle.subscriber_count(), 1);

        assert_eq!(lifecycle.emit(AppState::Foreground), 1);
        assert_eq!(handle.next().await, Some(AppState::Foreground));
    }

    #[tokio::test]
    async fn emit_without_subscribers_reports_zero() {
        let lifecycle = ManualLifecycle::new();
        assert_eq!(lifecycle.emit(AppState::Background), 0);
    }
}
