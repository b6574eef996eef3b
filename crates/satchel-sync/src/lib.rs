//! # Satchel Sync Engine
//!
//! Cross-device encrypted state synchronization: one logical user identity,
//! spread across independently-persisted local stores, serialized into a
//! single versioned snapshot, encrypted with a device-scoped symmetric key,
//! and mirrored against a remote holder with whole-record last-write-wins
//! semantics.
//!
//! This crate provides:
//! - **Device identity**: stable per-installation identifier ([`identity`])
//! - **Diagnostics**: bounded in-process sync log with a live subscriber
//!   ([`log`])
//! - **Readiness**: multi-store hydration gate ([`hydration`])
//! - **Key management**: persisted root key + HKDF-derived cipher key
//!   ([`keys`])
//! - **Snapshot pipeline**: deterministic codec and push/pull transport
//!   ([`codec`], [`transport`])
//! - **Orchestration**: lifecycle-driven sync controller ([`controller`])
//! - **Profile bridge**: eventually-consistent observable side channel
//!   ([`profile`])
//!
//! All I/O goes through the effect interfaces in `satchel-core`; in-memory
//! handlers for tests live in `satchel-testkit`.

#![forbid(unsafe_code)]

pub mod codec;
pub mod controller;
pub mod hydration;
pub mod identity;
pub mod keys;
pub mod log;
pub mod profile;
pub mod transport;

pub use codec::{EncryptedSnapshot, SnapshotCodec, SNAPSHOT_SCHEMA_VERSION};
pub use controller::{
    ControllerState, SyncControllerConfig, SyncLifecycleController, SyncLifecycleControllerBuilder,
};
pub use hydration::HydrationGate;
pub use identity::DeviceIdentityProvider;
pub use keys::{SyncKey, SyncKeyManager};
pub use log::{LogSubscriber, SyncLog, DEFAULT_LOG_CAPACITY};
pub use profile::RemoteProfileBridge;
pub use transport::{PullOutcome, SnapshotTransport};
