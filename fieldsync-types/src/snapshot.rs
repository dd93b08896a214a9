//! Versioned content snapshots.
//!
//! A snapshot is a full copy of the content map. The `version` is the only
//! ordering the system trusts: readers pick the highest version, and the
//! content store refuses anything older than what it already holds.

use crate::clock::{now_millis, Millis};
use crate::field::PendingChange;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Where a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    /// Fetched from the remote content endpoint.
    Remote,
    /// Produced by a local commit or loaded from a storage tier.
    Local,
    /// Nothing was available; empty placeholder.
    #[default]
    Default,
}

/// A versioned, timestamped copy of the full content map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSnapshot {
    /// Field key to value.
    pub data: BTreeMap<String, String>,
    /// Creation time (ms since epoch).
    pub timestamp: Millis,
    /// Monotonic version.
    pub version: u64,
    /// Origin of the snapshot.
    pub source: SnapshotSource,
}

/// One field whose remote value differs from the local one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    pub field: String,
    pub local: Option<String>,
    pub remote: String,
}

impl ContentSnapshot {
    /// The empty snapshot used when nothing else is available.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data: BTreeMap::new(),
            timestamp: 0,
            version: 0,
            source: SnapshotSource::Default,
        }
    }

    /// Creates a snapshot stamped with the current time.
    #[must_use]
    pub fn new(data: BTreeMap<String, String>, version: u64, source: SnapshotSource) -> Self {
        Self {
            data,
            timestamp: now_millis(),
            version,
            source,
        }
    }

    /// Returns a field's value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.data.get(field).map(String::as_str)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Orders snapshots by version, then by timestamp.
    #[must_use]
    pub fn precedence_cmp(&self, other: &Self) -> Ordering {
        self.version
            .cmp(&other.version)
            .then(self.timestamp.cmp(&other.timestamp))
    }

    /// Returns true if this snapshot should win over `other` on read.
    #[must_use]
    pub fn supersedes(&self, other: &Self) -> bool {
        self.precedence_cmp(other) == Ordering::Greater
    }

    /// Applies pending changes on top of this snapshot.
    ///
    /// Returns the next snapshot and the keys whose value actually changed.
    /// When nothing changes the snapshot is returned as-is, version included,
    /// so re-applying the same batch is idempotent.
    #[must_use]
    pub fn apply_changes(
        &self,
        changes: &[PendingChange],
        source: SnapshotSource,
    ) -> (Self, Vec<String>) {
        let mut data = self.data.clone();
        let mut changed = Vec::new();
        for change in changes {
            if data.get(&change.field) != Some(&change.value) {
                data.insert(change.field.clone(), change.value.clone());
                if !changed.contains(&change.field) {
                    changed.push(change.field.clone());
                }
            }
        }

        if changed.is_empty() {
            return (self.clone(), changed);
        }

        (Self::new(data, self.version + 1, source), changed)
    }

    /// Compares a remote content map against this snapshot.
    ///
    /// Only fields present in `remote` are considered; fields the remote does
    /// not mention are never reported as removed.
    #[must_use]
    pub fn diff(&self, remote: &BTreeMap<String, String>) -> Vec<FieldDiff> {
        remote
            .iter()
            .filter(|(field, value)| self.data.get(*field) != Some(*value))
            .map(|(field, value)| FieldDiff {
                field: field.clone(),
                local: self.data.get(field).cloned(),
                remote: value.clone(),
            })
            .collect()
    }
}

impl Default for ContentSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}
