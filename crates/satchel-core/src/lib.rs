//! Satchel Core - foundation for cross-device state synchronization
//!
//! This crate provides the pure building blocks shared by the sync subsystem:
//! data shapes for snapshots and diagnostics, the unified error taxonomy, the
//! effect interfaces behind which all I/O happens, and a small reactive cell
//! used for hydration flags and observable caches.
//!
//! No orchestration lives here. The sync pipeline itself (identity, key
//! management, codec, transport, lifecycle controller) is `satchel-sync`;
//! in-memory effect handlers for tests are `satchel-testkit`.

#![forbid(unsafe_code)]

/// Pure effect interfaces (no implementations)
pub mod effects;

/// Unified error handling
pub mod errors;

/// Reactive value cell with poll-based subscriptions
pub mod reactive;

/// Snapshot, log, profile, and health data shapes
pub mod types;

pub use errors::{Result, SyncError};
pub use reactive::{Dynamic, Subscription};
pub use types::{
    DeviceId, LogEntry, LogLevel, ProfileField, ProfileRecord, RemoteSnapshotRecord,
    StateSnapshot, StateStore, StoreError, SyncHealth,
};
