//! Unified error taxonomy for the sync subsystem.
//!
//! Every failure inside the sync pipeline is one of these variants. The
//! lifecycle controller catches them at its boundary, logs them, and folds
//! them into the sync-health surface rather than throwing them at callers.

use serde::{Deserialize, Serialize};

use crate::effects::{EndpointError, StorageError};
use crate::types::StoreError;

/// Unified error type for all sync operations.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum SyncError {
    /// Local durable storage read/write failed. Retryable by the caller.
    #[error("Local storage unavailable: {reason}")]
    StorageUnavailable {
        /// What the storage layer reported
        reason: String,
    },

    /// A transport call failed before reaching the remote. Retryable on the
    /// next lifecycle trigger; no snapshot state is lost since export happens
    /// before upload.
    #[error("Network unavailable: {reason}")]
    NetworkUnavailable {
        /// What the transport layer reported
        reason: String,
    },

    /// The remote refused the request (auth/ownership mismatch). Not retried
    /// automatically; surfaced through the sync-health indicator.
    #[error("Remote rejected request: {reason}")]
    RemoteRejected {
        /// What the remote reported
        reason: String,
    },

    /// Ciphertext could not be authenticated or decrypted (wrong or rotated
    /// key, or corruption). Fatal for that pull; distinguishable from "no
    /// remote data yet", which is not an error.
    #[error("Snapshot decryption failed: {reason}")]
    DecryptionFailed {
        /// What the cipher reported
        reason: String,
    },

    /// The remote snapshot was written by a newer build than this one
    /// understands. The pull aborts with local state untouched.
    #[error("Snapshot schema version {found} is newer than supported version {supported}")]
    SchemaVersionMismatch {
        /// Schema version carried by the remote snapshot
        found: u32,
        /// Newest schema version this build can apply
        supported: u32,
    },

    /// A snapshot document failed to encode or decode.
    #[error("Serialization failed: {reason}")]
    Serialization {
        /// What the codec reported
        reason: String,
    },

    /// Persisted key material is missing or malformed after snapshots were
    /// pushed under it. Unrecoverable for those snapshots; escalated as a
    /// user-visible data-recovery event, never silently retried.
    #[error("Sync key unavailable: {reason}")]
    KeyLost {
        /// Why the key could not be recovered
        reason: String,
    },

    /// A decrypted snapshot was structurally unusable: bad document shape,
    /// checksum mismatch, or a store sub-payload that fails validation. The
    /// whole apply fails; no store is partially merged.
    #[error("Invalid snapshot: {reason}")]
    InvalidSnapshot {
        /// What made the snapshot unusable
        reason: String,
    },
}

impl SyncError {
    /// Create a storage-unavailable error
    pub fn storage_unavailable(reason: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a network-unavailable error
    pub fn network_unavailable(reason: impl Into<String>) -> Self {
        Self::NetworkUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a remote-rejected error
    pub fn remote_rejected(reason: impl Into<String>) -> Self {
        Self::RemoteRejected {
            reason: reason.into(),
        }
    }

    /// Create a decryption-failed error
    pub fn decryption_failed(reason: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            reason: reason.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    /// Create a key-lost error
    pub fn key_lost(reason: impl Into<String>) -> Self {
        Self::KeyLost {
            reason: reason.into(),
        }
    }

    /// Create an invalid-snapshot error
    pub fn invalid_snapshot(reason: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
            reason: reason.into(),
        }
    }

    /// Whether the next natural lifecycle trigger is expected to succeed
    /// where this failure did not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable { .. } | Self::NetworkUnavailable { .. }
        )
    }

    /// Whether this failure must be escalated as user-facing unrecoverable
    /// rather than absorbed into sync health.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::KeyLost { .. })
    }
}

/// Standard Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        Self::storage_unavailable(err.to_string())
    }
}

impl From<EndpointError> for SyncError {
    fn from(err: EndpointError) -> Self {
        match err {
            EndpointError::Unavailable { reason } => Self::NetworkUnavailable { reason },
            EndpointError::Rejected { reason } => Self::RemoteRejected { reason },
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        Self::invalid_snapshot(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::storage_unavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_errors_map_onto_the_taxonomy() {
        let unavailable: SyncError = EndpointError::unavailable("connection refused").into();
        assert!(matches!(unavailable, SyncError::NetworkUnavailable { .. }));
        assert!(unavailable.is_retryable());

        let rejected: SyncError = EndpointError::rejected("ownership mismatch").into();
        assert!(matches!(rejected, SyncError::RemoteRejected { .. }));
        assert!(!rejected.is_retryable());
    }

    #[test]
    fn key_loss_is_unrecoverable() {
        let err = SyncError::key_lost("persisted material missing");
        assert!(err.is_unrecoverable());
        assert!(!SyncError::decryption_failed("bad tag").is_unrecoverable());
    }

    #[test]
    fn schema_mismatch_display_names_both_versions() {
        let err = SyncError::SchemaVersionMismatch {
            found: 3,
            supported: 1,
        };
        let rendered = err.to_string();
        assert!(rendered.contains('3'));
        assert!(rendered.contains('1'));
    }
}
