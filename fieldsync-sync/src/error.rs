//! Error types for the sync layer.
//!
//! Each error class has a fixed containment rule: `SyncError` never leaves the
//! scheduler, `ProtocolError` never leaves the bridge, and only `SaveError`
//! is surfaced to the host.

use fieldsync_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

/// Result type for remote fetch/save operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// A remote fetch or save attempt failed.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// The endpoint answered with a non-success status.
    #[error("remote returned status {status}")]
    Status { status: u16 },

    /// The response body was not a content map.
    #[error("malformed content payload: {0}")]
    Malformed(String),

    /// The save endpoint answered `success: false`.
    #[error("remote rejected the save: {0}")]
    Rejected(String),

    /// No response within the fetch or save timeout.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The outbound host channel is gone.
    #[error("channel closed")]
    ChannelClosed,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// A save could not be completed. The optimistic local value is kept.
#[derive(Debug, Error)]
pub enum SaveError {
    /// Every storage tier rejected the snapshot.
    #[error("local persistence failed: {0}")]
    Persistence(#[from] StorageError),

    /// The remote save endpoint kept failing.
    #[error("remote save failed after {attempts} attempts: {last}")]
    RemoteExhausted { attempts: u32, last: String },
}

/// A host message was rejected at the boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Sender origin is not on the allow-list.
    #[error("untrusted origin: {0}")]
    UntrustedOrigin(String),

    /// Payload is not a well-formed message.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The `type` tag is outside the known set.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// A field key cannot address a field.
    #[error("invalid field key: {0:?}")]
    InvalidField(String),
}
