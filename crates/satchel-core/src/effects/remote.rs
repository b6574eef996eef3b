//! Remote endpoint interfaces.
//!
//! Two independent remote surfaces exist. The snapshot holder keeps exactly
//! one encrypted record per user with read-latest/write-latest semantics.
//! The profile endpoint is a plain get/set pair for the lightweight bridge
//! channel and never sees snapshot ciphertext.
//!
//! Transport security (TLS) is assumed at the implementation layer and not
//! modeled here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{ProfileRecord, RemoteSnapshotRecord};

/// Remote endpoint operation errors.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum EndpointError {
    /// The endpoint could not be reached; retryable on the next trigger
    #[error("Endpoint unavailable: {reason}")]
    Unavailable {
        /// What the transport reported
        reason: String,
    },
    /// The endpoint refused the request (auth/ownership mismatch)
    #[error("Endpoint rejected request: {reason}")]
    Rejected {
        /// What the endpoint reported
        reason: String,
    },
}

impl EndpointError {
    /// Create an unavailable error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create a rejected error
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// The remote holder of the single encrypted snapshot record.
///
/// An implementation is already scoped to one authenticated user identity;
/// there is exactly one record behind it.
#[async_trait]
pub trait SnapshotEndpoint: Send + Sync {
    /// Overwrite the user's snapshot record. Last write wins at whole-record
    /// granularity; uploading an equivalent record twice is safe.
    async fn put_latest(&self, record: RemoteSnapshotRecord) -> Result<(), EndpointError>;

    /// Fetch the user's current snapshot record. `None` means no device has
    /// pushed yet, which is not a failure.
    async fn get_latest(&self) -> Result<Option<RemoteSnapshotRecord>, EndpointError>;
}

/// The remote get/set pair behind the profile observable bridge.
#[async_trait]
pub trait ProfileEndpoint: Send + Sync {
    /// Fetch the remote profile record, if one has been written.
    async fn get_profile(&self) -> Result<Option<ProfileRecord>, EndpointError>;

    /// Overwrite the remote profile record.
    async fn set_profile(&self, record: ProfileRecord) -> Result<(), EndpointError>;
}
