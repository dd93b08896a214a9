//! The storage tier contract and the shared blob format.

use crate::error::{TierError, TierResult};
use async_trait::async_trait;
use fieldsync_types::{ContentSnapshot, Millis, SnapshotSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which storage mechanism a tier wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    /// Origin-scoped, survives restarts.
    FastDurable,
    /// Lives for one session only.
    Session,
    /// Transactional, larger payloads, history.
    Transactional,
}

impl TierKind {
    /// Short name used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FastDurable => "fast-durable",
            Self::Session => "session",
            Self::Transactional => "transactional",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A uniform save/load primitive over one storage mechanism.
///
/// Implementations must never panic across this boundary; every failure is
/// reported as a [`TierError`].
#[async_trait]
pub trait StorageTier: Send + Sync {
    /// The mechanism this tier wraps.
    fn kind(&self) -> TierKind;

    /// Persists a snapshot, replacing whatever the tier held.
    async fn save(&self, snapshot: &ContentSnapshot) -> TierResult<()>;

    /// Loads the stored snapshot, `None` if the tier is empty.
    async fn load(&self) -> TierResult<Option<ContentSnapshot>>;

    /// Removes the stored snapshot. Failures are logged, not returned.
    async fn clear(&self);
}

/// On-disk shape shared by every tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    pub version: u64,
    pub timestamp: Millis,
    pub data: BTreeMap<String, String>,
}

impl From<&ContentSnapshot> for StoredSnapshot {
    fn from(snapshot: &ContentSnapshot) -> Self {
        Self {
            version: snapshot.version,
            timestamp: snapshot.timestamp,
            data: snapshot.data.clone(),
        }
    }
}

impl From<StoredSnapshot> for ContentSnapshot {
    fn from(stored: StoredSnapshot) -> Self {
        Self {
            data: stored.data,
            timestamp: stored.timestamp,
            version: stored.version,
            source: SnapshotSource::Local,
        }
    }
}

/// Encodes a snapshot into the tier blob format.
pub fn encode_blob(snapshot: &ContentSnapshot) -> TierResult<String> {
    Ok(serde_json::to_string(&StoredSnapshot::from(snapshot))?)
}

/// Decodes a tier blob. Parse failures are reported as corruption.
pub fn decode_blob(tier: TierKind, blob: &str) -> TierResult<ContentSnapshot> {
    serde_json::from_str::<StoredSnapshot>(blob)
        .map(ContentSnapshot::from)
        .map_err(|e| TierError::Corrupted {
            tier,
            reason: e.to_string(),
        })
}

/// Fails with `QuotaExceeded` when a blob is larger than an optional quota.
pub(crate) fn check_quota(tier: TierKind, quota: Option<usize>, needed: usize) -> TierResult<()> {
    match quota {
        Some(quota) if needed > quota => Err(TierError::QuotaExceeded {
            tier,
            needed,
            quota,
        }),
        _ => Ok(()),
    }
}
