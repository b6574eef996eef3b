//! Effect interfaces for the sync subsystem
//!
//! Every I/O the pipeline performs goes through one of these traits: durable
//! local key-value storage, the remote snapshot holder, the remote profile
//! get/set pair, and the application lifecycle event source. Production
//! hosts implement them against their platform; `satchel-testkit` provides
//! in-memory handlers for tests. Domain code never talks to a platform API
//! directly.

pub mod lifecycle;
pub mod remote;
pub mod storage;

pub use lifecycle::{AppState, LifecycleEvents, LifecycleHandle};
pub use remote::{EndpointError, ProfileEndpoint, SnapshotEndpoint};
pub use storage::{KeyValueEffects, StorageError};
