//! Dynamic<T> - a reactive value with change notifications
//!
//! `Dynamic<T>` wraps a value and provides subscription-based change
//! notification. The sync subsystem uses it for store hydration flags, the
//! entitlement flag, and the profile bridge cache.
//!
//! # Runtime Agnostic Design
//!
//! Only std primitives (RwLock, AtomicU64) are used, so the cell works with
//! any async runtime or in sync-only code. Subscriptions track versions and
//! poll for changes rather than using push-based channels.

// Allow expect on RwLock::read/write - lock poisoning from panics
// is unrecoverable, so expect() is the appropriate handling pattern.
#![allow(clippy::expect_used)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Inner state of a Dynamic value.
struct DynamicInner<T> {
    /// The current value, protected by RwLock for sync access.
    value: RwLock<T>,
    /// Version counter incremented on each update.
    version: AtomicU64,
}

/// A reactive value that can be observed for changes.
///
/// `Dynamic<T>` provides:
/// - `get()`: Synchronously read the current value
/// - `set()`: Update the value and increment version
/// - `subscribe()`: Get a `Subscription` for polling changes
///
/// # Thread Safety
///
/// `Dynamic<T>` is `Send + Sync` and can be safely shared across threads.
/// Within the sync subsystem each cell has a single designated writer; all
/// other holders only read.
#[derive(Clone)]
pub struct Dynamic<T> {
    inner: Arc<DynamicInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> Dynamic<T> {
    /// Create a new Dynamic with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(DynamicInner {
                value: RwLock::new(value),
                version: AtomicU64::new(0),
            }),
        }
    }

    /// Get the current value.
    ///
    /// This is a synchronous operation that clones the value.
    pub fn get(&self) -> T {
        self.inner
            .value
            .read()
            .expect("Dynamic lock poisoned")
            .clone()
    }

    /// Get the current version number.
    ///
    /// The version is incremented each time `set()` is called.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Set a new value and increment the version.
    ///
    /// This is a synchronous operation. Subscriptions will see the
    /// new value on their next `poll()` call.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.inner.value.write().expect("Dynamic lock poisoned");
            *guard = value;
        }

        self.inner.version.fetch_add(1, Ordering::Release);
    }

    /// Update the value using a function.
    ///
    /// Reads the current value, applies the function, and sets the result.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(T) -> T,
    {
        let new_value = f(self.get());
        self.set(new_value);
    }

    /// Subscribe to value changes.
    ///
    /// Returns a `Subscription` that can poll for changes. The subscription
    /// tracks the version it last saw and returns new values when the
    /// Dynamic has been updated.
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            source: self.inner.clone(),
            last_version: self.inner.version.load(Ordering::Acquire),
        }
    }
}

impl<T: Clone + Send + Sync + Default + 'static> Default for Dynamic<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + Send + Sync + std::fmt::Debug + 'static> std::fmt::Debug for Dynamic<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dynamic")
            .field("value", &self.get())
            .field("version", &self.version())
            .finish()
    }
}

/// A subscription to a Dynamic value for polling changes.
///
/// `Subscription` tracks the version it last observed and provides
/// polling-based change detection.
pub struct Subscription<T> {
    source: Arc<DynamicInner<T>>,
    last_version: u64,
}

impl<T: Clone + Send + Sync + 'static> Subscription<T> {
    /// Check if the source has changed since the last poll.
    pub fn has_changed(&self) -> bool {
        self.source.version.load(Ordering::Acquire) > self.last_version
    }

    /// Poll for a new value.
    ///
    /// Returns `Some(value)` if the source has been updated since the last
    /// poll, updating the subscription's tracked version. Returns `None` if
    /// no change.
    pub fn poll(&mut self) -> Option<T> {
        let current_version = self.source.version.load(Ordering::Acquire);
        if current_version > self.last_version {
            self.last_version = current_version;
            Some(
                self.source
                    .value
                    .read()
                    .expect("Dynamic lock poisoned")
                    .clone(),
            )
        } else {
            None
        }
    }

    /// Get the current value regardless of change state.
    pub fn get(&self) -> T {
        self.source
            .value
            .read()
            .expect("Dynamic lock poisoned")
            .clone()
    }
}
