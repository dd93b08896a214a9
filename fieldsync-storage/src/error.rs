//! Error types for the storage layer.

use crate::tier::TierKind;
use thiserror::Error;

/// Result type for a single tier operation.
pub type TierResult<T> = Result<T, TierError>;

/// Result type for manager operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failure of one storage mechanism. Always contained by the manager.
#[derive(Debug, Error)]
pub enum TierError {
    /// The mechanism cannot be used in this context.
    #[error("{tier} tier unavailable: {reason}")]
    Unavailable { tier: TierKind, reason: String },

    /// The blob does not fit into the tier's quota.
    #[error("{tier} tier quota exceeded: {needed} bytes > {quota} bytes")]
    QuotaExceeded {
        tier: TierKind,
        needed: usize,
        quota: usize,
    },

    /// A stored blob could not be parsed.
    #[error("{tier} tier holds a corrupted snapshot: {reason}")]
    Corrupted { tier: TierKind, reason: String },

    /// Serialization error while encoding a snapshot.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Errors surfaced by the tier manager.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Every tier rejected the write.
    #[error("all {} storage tiers rejected the write", .failures.len())]
    AllTiersFailed { failures: Vec<(TierKind, TierError)> },

    /// The manager was built without any tier.
    #[error("no storage tiers configured")]
    NoTiers,
}
