//! Durable local key-value storage interface.
//!
//! The sync subsystem persists only small string-keyed JSON-serializable
//! values: the device identity, sync key material, and the profile bridge
//! cache. Feature stores persist their own blobs behind their own hydrate/
//! export/import surface and are not reached through this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Storage operation errors.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum StorageError {
    /// A read failed at the storage layer
    #[error("Read failed: {reason}")]
    ReadFailed {
        /// What the storage layer reported
        reason: String,
    },
    /// A write failed at the storage layer
    #[error("Write failed: {reason}")]
    WriteFailed {
        /// What the storage layer reported
        reason: String,
    },
    /// The key is not usable by this storage backend
    #[error("Invalid key: {reason}")]
    InvalidKey {
        /// Why the key was rejected
        reason: String,
    },
}

impl StorageError {
    /// Create a read-failed error
    pub fn read_failed(reason: impl Into<String>) -> Self {
        Self::ReadFailed {
            reason: reason.into(),
        }
    }

    /// Create a write-failed error
    pub fn write_failed(reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid-key error
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            reason: reason.into(),
        }
    }
}

/// Durable string-keyed storage for small values.
///
/// All operations are asynchronous; durable storage is I/O-bound on every
/// supported platform. Implementations must be safe to share across tasks.
#[async_trait]
pub trait KeyValueEffects: Send + Sync {
    /// Read the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, overwriting any prior value.
    async fn put(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Remove the value stored under `key`. Returns whether a value existed.
    async fn remove(&self, key: &str) -> Result<bool, StorageError>;
}
