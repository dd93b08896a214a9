//! Core content model for fieldsync.
//!
//! This crate defines the plain data types shared by the storage tiers, the
//! sync engine and the daemon:
//! - Content fields and their format
//! - Versioned content snapshots
//! - Pending local edits
//! - Batch identifiers (UUID v7)
//! - Wall-clock helpers in milliseconds since the Unix epoch
//!
//! Nothing here performs I/O.

mod clock;
mod field;
mod ids;
mod snapshot;

pub use clock::{now_millis, Millis};
pub use field::{ContentField, FieldFormat, PendingChange};
pub use ids::BatchId;
pub use snapshot::{ContentSnapshot, FieldDiff, SnapshotSource};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid field key: {0:?}")]
    InvalidKey(String),
}
