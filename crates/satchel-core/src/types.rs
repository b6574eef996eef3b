//! Data shapes shared across the sync subsystem.
//!
//! Everything here is a plain value type: snapshot documents, diagnostic log
//! entries, the profile record with its field-level merge, and the sync
//! health surface. The one trait, [`StateStore`], is the seam through which
//! feature stores expose themselves to the pipeline without leaking their
//! internals.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// =============================================================================
// Device identity
// =============================================================================

/// Stable per-installation identifier, a UUIDv4 rendered as a string.
///
/// Created once on first access and immutable thereafter; only the explicit
/// app-reset flow discards it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Wrap an already-persisted identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Diagnostic log entries
// =============================================================================

/// Severity of a diagnostic log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Verbose,
    Error,
}

/// One timestamped diagnostic entry in the sync log.
///
/// Entries are never mutated after creation and never leave the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was appended
    pub timestamp: DateTime<Utc>,
    /// Human-readable message, already redacted of key-like material
    pub message: String,
    /// Severity
    pub level: LogLevel,
}

// =============================================================================
// Snapshot documents
// =============================================================================

/// One versioned serialization of all synchronized store states.
///
/// Constructed fresh on every push and discarded immediately after apply on
/// every pull. Application is all-or-nothing at the snapshot boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Document schema version; pulls reject versions newer than the build
    pub schema_version: u32,
    /// When the snapshot was exported
    pub created_at: DateTime<Utc>,
    /// Device that exported the snapshot
    pub device_id: DeviceId,
    /// Store name to that store's serialized state. `BTreeMap` keeps the
    /// encoded document deterministic for identical inputs.
    pub payload: BTreeMap<String, serde_json::Value>,
}

/// The server-held counterpart of a snapshot: one record per user identity,
/// overwritten on every push, last-writer-wins at whole-record granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSnapshotRecord {
    /// Device that wrote the record
    pub device_id: DeviceId,
    /// AEAD ciphertext of the encoded [`StateSnapshot`]
    pub encrypted_payload: Vec<u8>,
    /// SHA-256 of `encrypted_payload`, hex-encoded
    pub checksum: String,
    /// When the record was written
    pub updated_at: DateTime<Utc>,
}

/// SHA-256 checksum of a byte payload, hex-encoded.
pub fn sha256_checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

// =============================================================================
// Profile record (bridge channel)
// =============================================================================

/// One field of the profile record: a value plus the instant it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileField {
    /// Field value
    pub value: serde_json::Value,
    /// When the field was last written, on whichever device wrote it
    pub updated_at: DateTime<Utc>,
}

/// The small profile record mirrored by the observable bridge.
///
/// Unlike the snapshot pipeline this record is eventually consistent at
/// single-field granularity: [`ProfileRecord::merge`] keeps, per field,
/// whichever side wrote most recently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Field name to field value and write instant
    pub fields: BTreeMap<String, ProfileField>,
}

impl ProfileRecord {
    /// Read a field's value, if present.
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name).map(|field| &field.value)
    }

    /// Write a field with the given timestamp.
    pub fn set(&mut self, name: impl Into<String>, value: serde_json::Value, at: DateTime<Utc>) {
        self.fields.insert(
            name.into(),
            ProfileField {
                value,
                updated_at: at,
            },
        );
    }

    /// Merge another record into this one, last-write-wins per field.
    ///
    /// Fields present on only one side are kept. Returns true when any field
    /// of `self` changed.
    pub fn merge(&mut self, other: &ProfileRecord) -> bool {
        let mut changed = false;
        for (name, incoming) in &other.fields {
            match self.fields.get(name) {
                Some(existing) if existing.updated_at >= incoming.updated_at => {}
                _ => {
                    self.fields.insert(name.clone(), incoming.clone());
                    changed = true;
                }
            }
        }
        changed
    }
}

// =============================================================================
// Sync health
// =============================================================================

/// Controller-visible outcome of recent sync episodes.
///
/// Pipeline failures are folded in here instead of being thrown at the UI
/// layer; only unrecoverable key loss is additionally escalated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncHealth {
    /// Completion instant of the last successful push
    pub last_push_at: Option<DateTime<Utc>>,
    /// Completion instant of the last successful pull
    pub last_pull_at: Option<DateTime<Utc>>,
    /// Rendered error of the most recent failed episode, cleared on success
    pub last_error: Option<String>,
    /// Failed episodes since the last success
    pub consecutive_failures: u32,
    /// Set when key material was lost after snapshots were pushed under it.
    /// A user-visible data-recovery event, not a retryable condition.
    pub unrecoverable: bool,
}

// =============================================================================
// Store seam
// =============================================================================

/// Error raised by a feature store's export/import surface.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum StoreError {
    /// The store could not serialize its current state
    #[error("Export failed: {reason}")]
    ExportFailed {
        /// What the store reported
        reason: String,
    },
    /// The store rejected or failed to apply an incoming state
    #[error("Import failed: {reason}")]
    ImportFailed {
        /// What the store reported
        reason: String,
    },
    /// The incoming state does not have the shape this store serializes
    #[error("Invalid state: {reason}")]
    InvalidState {
        /// What was wrong with the shape
        reason: String,
    },
}

impl StoreError {
    /// Create an export-failed error
    pub fn export_failed(reason: impl Into<String>) -> Self {
        Self::ExportFailed {
            reason: reason.into(),
        }
    }

    /// Create an import-failed error
    pub fn import_failed(reason: impl Into<String>) -> Self {
        Self::ImportFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid-state error
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }
}

/// A feature store as the sync pipeline sees it: a name, a public export, a
/// public import, and nothing else.
///
/// The pipeline never reaches into a store's internals. Import is expected to
/// replace the store's state wholesale (no merging) and to be idempotent for
/// identical input.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Stable name keying this store's sub-payload in the snapshot document.
    fn name(&self) -> &str;

    /// Serialize the store's current state.
    async fn export_state(&self) -> std::result::Result<serde_json::Value, StoreError>;

    /// Cheap structural check of an incoming state, called for every store
    /// named in a snapshot before any store's import runs. A failure here
    /// fails the whole apply.
    fn validate_state(&self, state: &serde_json::Value) -> std::result::Result<(), StoreError>;

    /// Replace the store's state with the incoming one.
    async fn import_state(&self, state: serde_json::Value)
        -> std::result::Result<(), StoreError>;
}
