//! Satchel testing infrastructure
//!
//! In-memory implementations of the `satchel-core` effect interfaces, plus a
//! controllable state-store fixture. Every handler supports the failure
//! injection the sync pipeline's error paths need, so no test ever reaches
//! for a real platform backend.
//!
//! # Usage
//!
//! Add this to your crate's `Cargo.toml` dev-dependencies:
//! ```toml
//! [dev-dependencies]
//! satchel-testkit = { workspace = true }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod endpoints;
pub mod lifecycle;
pub mod storage;
pub mod store;

pub use endpoints::{MemoryProfileEndpoint, MemorySnapshotEndpoint};
pub use lifecycle::ManualLifecycle;
pub use storage::MemoryKeyValueStore;
pub use store::MemoryStateStore;
