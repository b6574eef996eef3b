//! In-memory remote endpoints for testing.
//!
//! Both endpoints count their calls, hold the same single record a real
//! holder would, and can be told to fail or to respond slowly (the latter is
//! how overlap tests keep an episode in flight).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use satchel_core::effects::{EndpointError, ProfileEndpoint, SnapshotEndpoint};
use satchel_core::{ProfileRecord, RemoteSnapshotRecord};

/// In-memory snapshot holder: one record, overwritten on push.
pub struct MemorySnapshotEndpoint {
    record: Mutex<Option<RemoteSnapshotRecord>>,
    push_count: AtomicUsize,
    pull_count: AtomicUsize,
    fail_next: Mutex<Option<EndpointError>>,
    latency: Mutex<Option<Duration>>,
}

impl MemorySnapshotEndpoint {
    /// Create an endpoint with no record yet.
    pub fn new() -> Self {
        Self {
            record: Mutex::new(None),
            push_count: AtomicUsize::new(0),
            pull_count: AtomicUsize::new(0),
            fail_next: Mutex::new(None),
            latency: Mutex::new(None),
        }
    }

    /// The currently held record.
    pub fn latest(&self) -> Option<RemoteSnapshotRecord> {
        self.record.lock().clone()
    }

    /// Replace the held record directly, bypassing counters.
    pub fn seed(&self, record: RemoteSnapshotRecord) {
        *self.record.lock() = Some(record);
    }

    /// How many pushes have been attempted.
    pub fn push_count(&self) -> usize {
        self.push_count.load(Ordering::SeqCst)
    }

    /// How many pulls have been attempted.
    pub fn pull_count(&self) -> usize {
        self.pull_count.load(Ordering::SeqCst)
    }

    /// Fail the next call with an unavailable error.
    pub fn fail_next_with_unavailable(&self, reason: &str) {
        *self.fail_next.lock() = Some(EndpointError::unavailable(reason));
    }

    /// Fail the next call with a rejection.
    pub fn fail_next_with_rejection(&self, reason: &str) {
        *self.fail_next.lock() = Some(EndpointError::rejected(reason));
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    fn take_failure(&self) -> Option<EndpointError> {
        self.fail_next.lock().take()
    }

    fn configured_latency(&self) -> Option<Duration> {
        *self.latency.lock()
    }
}

impl Default for MemorySnapshotEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotEndpoint for MemorySnapshotEndpoint {
    async fn put_latest(&self, record: RemoteSnapshotRecord) -> Result<(), EndpointError> {
        self.push_count.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.configured_latency() {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        *self.record.lock() = Some(record);
        Ok(())
    }

    async fn get_latest(&self) -> Result<Option<RemoteSnapshotRecord>, EndpointError> {
        self.pull_count.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.configured_latency() {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Ok(self.record.lock().clone())
    }
}

/// In-memory profile endpoint: one record behind a get/set pair.
pub struct MemoryProfileEndpoint {
    record: Mutex<Option<ProfileRecord>>,
    set_count: AtomicUsize,
    get_count: AtomicUsize,
    fail_next: Mutex<Option<EndpointError>>,
}

impl MemoryProfileEndpoint {
    /// Create an endpoint with no record yet.
    pub fn new() -> Self {
        Self {
            record: Mutex::new(None),
            set_count: AtomicUsize::new(0),
            get_count: AtomicUsize::new(0),
            fail_next: Mutex::new(None),
        }
    }

    /// The currently held record.
    pub fn latest(&self) -> Option<ProfileRecord> {
        self.record.lock().clone()
    }

    /// Replace the held record directly, bypassing counters.
    pub fn seed(&self, record: ProfileRecord) {
        *self.record.lock() = Some(record);
    }

    /// How many sets have been attempted.
    pub fn set_count(&self) -> usize {
        self.set_count.load(Ordering::SeqCst)
    }

    /// How many gets have been attempted.
    pub fn get_count(&self) -> usize {
        self.get_count.load(Ordering::SeqCst)
    }

    /// Fail the next call with an unavailable error.
    pub fn fail_next_with_unavailable(&self, reason: &str) {
        *self.fail_next.lock() = Some(EndpointError::unavailable(reason));
    }
}

impl Default for MemoryProfileEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileEndpoint for MemoryProfileEndpoint {
    async fn get_profile(&self) -> Result<Option<ProfileRecord>, EndpointError> {
        self.get_count.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_next.lock().take() {
            return Err(err);
        }
        Ok(self.record.lock().clone())
    }

    async fn set_profile(&self, record: ProfileRecord) -> Result<(), EndpointError> {
        self.set_count.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_next.lock().take() {
            return Err(err);
        }
        *self.record.lock() = Some(record);
        Ok(())
    }
}
