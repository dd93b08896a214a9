//! Fan-out writes and best-of reads across storage tiers.
//!
//! Writes go to every tier concurrently with no ordering between them. Reads
//! load every tier and keep the snapshot with the highest version, so the
//! order in which tiers finished writing never matters.

use crate::error::{StorageError, StorageResult, TierError};
use crate::tier::{StorageTier, TierKind};
use fieldsync_types::{ContentSnapshot, PendingChange, SnapshotSource};
use futures::future::join_all;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of one fan-out write.
#[derive(Debug)]
pub struct TierReport {
    /// The snapshot that was written.
    pub snapshot: ContentSnapshot,
    /// Fields whose value changed relative to the previous snapshot.
    pub changed: Vec<String>,
    /// Tiers that accepted the write.
    pub succeeded: Vec<TierKind>,
    /// Tiers that rejected it, with the reason.
    pub failed: Vec<(TierKind, TierError)>,
}

impl TierReport {
    /// True when every tier accepted the write.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Owns tier I/O. Never mutates the content store.
pub struct TierManager {
    tiers: Vec<Arc<dyn StorageTier>>,
    /// Highest snapshot this manager has written, loaded or been told about.
    latest: RwLock<ContentSnapshot>,
    /// Serializes read-modify-write cycles so two batches never share a version.
    write_lock: Mutex<()>,
}

impl TierManager {
    /// Creates a manager over the given tiers, in priority order.
    pub fn new(tiers: Vec<Arc<dyn StorageTier>>) -> Self {
        Self {
            tiers,
            latest: RwLock::new(ContentSnapshot::empty()),
            write_lock: Mutex::new(()),
        }
    }

    /// The managed tiers.
    pub fn tiers(&self) -> &[Arc<dyn StorageTier>] {
        &self.tiers
    }

    /// The latest known snapshot.
    pub fn latest(&self) -> ContentSnapshot {
        match self.latest.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Raises the latest known snapshot if `snapshot` supersedes it.
    ///
    /// Returns true when the snapshot was adopted.
    pub fn observe(&self, snapshot: &ContentSnapshot) -> bool {
        let mut guard = match self.latest.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if snapshot.supersedes(&guard) {
            *guard = snapshot.clone();
            true
        } else {
            false
        }
    }

    /// Merges changes into the latest snapshot and writes it to every tier.
    ///
    /// The version only advances when a value actually changes; re-saving an
    /// identical batch rewrites the same version to every tier.
    pub async fn save_all(&self, changes: &[PendingChange]) -> StorageResult<TierReport> {
        let _guard = self.write_lock.lock().await;
        let base = self.latest();
        let (snapshot, changed) = base.apply_changes(changes, SnapshotSource::Local);
        let report = self.write_everywhere(snapshot, changed).await?;
        self.observe(&report.snapshot);
        Ok(report)
    }

    /// Writes a whole snapshot (e.g. one assembled from a remote refresh).
    ///
    /// Returns `None` without writing when a newer snapshot is already known,
    /// so a slow writer can never roll the tiers back.
    pub async fn save_snapshot(
        &self,
        snapshot: &ContentSnapshot,
    ) -> StorageResult<Option<TierReport>> {
        let _guard = self.write_lock.lock().await;
        let latest = self.latest();
        if latest.supersedes(snapshot) {
            debug!(
                "Skipping write of v{}, tiers already hold v{}",
                snapshot.version, latest.version
            );
            return Ok(None);
        }
        let report = self.write_everywhere(snapshot.clone(), Vec::new()).await?;
        self.observe(&report.snapshot);
        Ok(Some(report))
    }

    async fn write_everywhere(
        &self,
        snapshot: ContentSnapshot,
        changed: Vec<String>,
    ) -> StorageResult<TierReport> {
        if self.tiers.is_empty() {
            return Err(StorageError::NoTiers);
        }

        let results = join_all(self.tiers.iter().map(|tier| {
            let snapshot = &snapshot;
            async move { (tier.kind(), tier.save(snapshot).await) }
        }))
        .await;

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for (kind, result) in results {
            match result {
                Ok(()) => succeeded.push(kind),
                Err(e) => {
                    warn!("Tier {} rejected snapshot v{}: {}", kind, snapshot.version, e);
                    failed.push((kind, e));
                }
            }
        }

        if succeeded.is_empty() {
            return Err(StorageError::AllTiersFailed { failures: failed });
        }

        debug!(
            "Persisted snapshot v{} to {}/{} tiers",
            snapshot.version,
            succeeded.len(),
            self.tiers.len()
        );

        Ok(TierReport {
            snapshot,
            changed,
            succeeded,
            failed,
        })
    }

    /// Loads every tier and returns the best snapshot.
    ///
    /// Highest version wins, ties go to the newest timestamp. Tiers that fail
    /// or hold corrupt data are skipped. With nothing usable the empty default
    /// snapshot is returned.
    pub async fn load_best(&self) -> ContentSnapshot {
        let results = join_all(
            self.tiers
                .iter()
                .map(|tier| async move { (tier.kind(), tier.load().await) }),
        )
        .await;

        let mut best: Option<ContentSnapshot> = None;
        for (kind, result) in results {
            match result {
                Ok(Some(snapshot)) => {
                    debug!("Tier {} holds snapshot v{}", kind, snapshot.version);
                    if best.as_ref().is_none_or(|b| snapshot.supersedes(b)) {
                        best = Some(snapshot);
                    }
                }
                Ok(None) => debug!("Tier {} is empty", kind),
                Err(e) => warn!("Skipping tier {} on load: {}", kind, e),
            }
        }

        match best {
            Some(snapshot) => {
                info!(
                    "Loaded snapshot v{} ({} fields)",
                    snapshot.version,
                    snapshot.len()
                );
                self.observe(&snapshot);
                snapshot
            }
            None => {
                info!("No stored snapshot found, starting empty");
                ContentSnapshot::empty()
            }
        }
    }

    /// Clears every tier.
    pub async fn clear_all(&self) {
        let _guard = self.write_lock.lock().await;
        join_all(self.tiers.iter().map(|tier| tier.clear())).await;
        match self.latest.write() {
            Ok(mut guard) => *guard = ContentSnapshot::empty(),
            Err(poisoned) => *poisoned.into_inner() = ContentSnapshot::empty(),
        }
    }
}
