//! Application lifecycle event source.
//!
//! The host application publishes coarse state transitions; the lifecycle
//! controller subscribes only once it is armed and reacts only to
//! entered-foreground. Subscription is a scoped acquisition: dropping the
//! returned [`LifecycleHandle`] releases the listener, so repeated
//! mount/unmount cycles cannot leak handlers.

use tokio::sync::broadcast;

/// Coarse application state carried by a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    /// The app is visible and interactive
    Foreground,
    /// The app has been backgrounded
    Background,
    /// The app is transitioning or obscured
    Inactive,
}

/// Source of application lifecycle transitions.
pub trait LifecycleEvents: Send + Sync {
    /// Acquire a listener for subsequent transitions. Events published
    /// before the call are not replayed.
    fn subscribe(&self) -> LifecycleHandle;
}

/// A held lifecycle listener.
///
/// The handle is the scope of the subscription: dropping it releases the
/// listener. Publishers can observe release through their receiver count.
pub struct LifecycleHandle {
    receiver: broadcast::Receiver<AppState>,
}

impl LifecycleHandle {
    /// Wrap a broadcast receiver obtained from the host's publisher.
    pub fn new(receiver: broadcast::Receiver<AppState>) -> Self {
        Self { receiver }
    }

    /// Await the next transition.
    ///
    /// Returns `None` once the publisher has gone away. A slow listener that
    /// misses events under burst resumes at the oldest retained event; the
    /// controller only classifies the latest state, so skipped intermediate
    /// transitions are harmless.
    pub async fn next(&mut self) -> Option<AppState> {
        loop {
            match self.receiver.recv().await {
                Ok(state) => return Some(state),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Drain any transition already delivered without waiting.
    ///
    /// Used to coalesce events that arrived while a sync episode was in
    /// flight: they must be ignored, not queued behind it.
    pub fn try_next(&mut self) -> Option<AppState> {
        loop {
            match self.receiver.try_recv() {
                Ok(state) => return Some(state),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
