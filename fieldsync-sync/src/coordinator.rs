//! Save coordination.
//!
//! A commit is applied locally first and persisted second; the remote copy is
//! updated last. Losing an edit is worse than a temporarily stale remote, so
//! a failed remote save never rolls the local value back.

use crate::error::{SaveError, SyncError};
use crate::grace::GracePeriodGuard;
use crate::protocol::FieldChange;
use crate::remote::ContentApi;
use crate::store::ContentStore;
use fieldsync_storage::{TierKind, TierManager};
use fieldsync_types::{BatchId, PendingChange, SnapshotSource};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Who initiated a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOrigin {
    /// The host already saved the batch (`apply-saved-changes`).
    Host,
    /// The frontend must push the batch to the save endpoint.
    Frontend,
}

/// What happened on the remote side of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// Host-confirmed batch, nothing to submit.
    NotRequired,
    /// The save endpoint accepted the batch.
    Confirmed { attempts: u32 },
}

/// Result of a successful commit.
#[derive(Debug, Clone)]
pub struct CommitReport {
    pub batch_id: BatchId,
    /// Fields in the batch, in batch order.
    pub fields: Vec<String>,
    /// Store version after the optimistic apply.
    pub version: u64,
    /// Tiers that accepted the snapshot.
    pub persisted_to: Vec<TierKind>,
    pub remote: RemoteOutcome,
}

/// Retry policy for frontend-initiated saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Attempt `n` waits `n * delay` before the next one.
    pub delay: Duration,
    /// Upper bound on one attempt; an attempt that runs over counts as failed.
    pub attempt_timeout: Duration,
}

struct Queued {
    seq: u64,
    change: PendingChange,
}

#[derive(Default)]
struct Queue {
    entries: Vec<Queued>,
    next_seq: u64,
}

/// Collects edits and commits them.
pub struct SaveCoordinator {
    store: Arc<ContentStore>,
    tiers: Arc<TierManager>,
    guard: Arc<GracePeriodGuard>,
    api: Arc<dyn ContentApi>,
    retry: RetryPolicy,
    queue: Mutex<Queue>,
}

impl SaveCoordinator {
    pub fn new(
        store: Arc<ContentStore>,
        tiers: Arc<TierManager>,
        guard: Arc<GracePeriodGuard>,
        api: Arc<dyn ContentApi>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            tiers,
            guard,
            api,
            retry,
            queue: Mutex::new(Queue::default()),
        }
    }

    /// The guard this coordinator activates.
    pub fn guard(&self) -> &Arc<GracePeriodGuard> {
        &self.guard
    }

    fn lock_queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues an edit. A newer edit to the same field replaces the older one
    /// and moves to the back of the queue.
    pub fn queue(&self, field: impl Into<String>, value: impl Into<String>) {
        let change = PendingChange::new(field, value);
        let mut queue = self.lock_queue();
        queue.entries.retain(|q| q.change.field != change.field);
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.entries.push(Queued { seq, change });
    }

    /// Pending edits in queue order.
    pub fn pending(&self) -> Vec<PendingChange> {
        self.lock_queue()
            .entries
            .iter()
            .map(|q| q.change.clone())
            .collect()
    }

    /// Drops the pending edit for a field. Returns true if one existed.
    pub fn discard(&self, field: &str) -> bool {
        let mut queue = self.lock_queue();
        let before = queue.entries.len();
        queue.entries.retain(|q| q.change.field != field);
        queue.entries.len() != before
    }

    /// Drops every pending edit.
    pub fn discard_all(&self) {
        self.lock_queue().entries.clear();
    }

    /// Commits every queued edit as a frontend-initiated batch.
    pub async fn flush(&self) -> Result<CommitReport, SaveError> {
        let changes = self.pending();
        self.commit(changes, CommitOrigin::Frontend).await
    }

    /// Commits a batch.
    ///
    /// 1. shield the batch fields and apply them to the store (no await in
    ///    between, so a concurrent refresh cannot slip in),
    /// 2. persist to every tier,
    /// 3. for frontend batches, submit to the save endpoint with retries.
    ///
    /// If every tier fails the commit stops after step 2 with the optimistic
    /// value and the shield still in place. Pending entries for the batch are
    /// cleared once the batch is confirmed.
    pub async fn commit(
        &self,
        changes: Vec<PendingChange>,
        origin: CommitOrigin,
    ) -> Result<CommitReport, SaveError> {
        let batch_id = BatchId::new();
        let changes = dedupe(changes);
        let fields: Vec<String> = changes.iter().map(|c| c.field.clone()).collect();
        let seq_at_start = self.lock_queue().next_seq;

        if changes.is_empty() {
            return Ok(CommitReport {
                batch_id,
                fields,
                version: self.store.version(),
                persisted_to: Vec::new(),
                remote: RemoteOutcome::NotRequired,
            });
        }

        debug!("Committing batch {} ({:?}): {:?}", batch_id, origin, fields);

        self.guard.activate_default(fields.iter().cloned());
        let optimistic = self.store.apply_changes(&changes, SnapshotSource::Local);

        self.tiers.observe(&optimistic);
        let persisted = match self.tiers.save_all(&changes).await {
            Ok(report) => report,
            Err(e) => {
                warn!("Batch {} could not be persisted locally: {}", batch_id, e);
                return Err(SaveError::Persistence(e));
            }
        };
        // Tiers may have merged onto a newer snapshot than ours.
        self.store.replace(persisted.snapshot.clone());

        let remote = match origin {
            CommitOrigin::Host => RemoteOutcome::NotRequired,
            CommitOrigin::Frontend => self.submit(batch_id, &changes).await?,
        };
        self.clear_confirmed(&fields, seq_at_start);

        info!(
            "Batch {} committed: {} field(s), v{}",
            batch_id,
            fields.len(),
            optimistic.version
        );
        Ok(CommitReport {
            batch_id,
            fields,
            version: self.store.version(),
            persisted_to: persisted.succeeded,
            remote,
        })
    }

    async fn submit(
        &self,
        batch_id: BatchId,
        changes: &[PendingChange],
    ) -> Result<RemoteOutcome, SaveError> {
        let wire: Vec<FieldChange> = changes.iter().map(FieldChange::from).collect();
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let answered = timeout(self.retry.attempt_timeout, self.api.save_changes(&wire))
                .await
                .unwrap_or(Err(SyncError::Timeout(self.retry.attempt_timeout)));
            match answered {
                Ok(response) if response.success => {
                    debug!("Batch {} saved remotely on attempt {}", batch_id, attempt);
                    return Ok(RemoteOutcome::Confirmed { attempts: attempt });
                }
                Ok(response) => {
                    last_error = SyncError::Rejected(
                        response.message.unwrap_or_else(|| "no message".to_string()),
                    )
                    .to_string();
                }
                Err(e) => last_error = e.to_string(),
            }

            warn!(
                "Remote save of batch {} failed (attempt {}/{}): {}",
                batch_id, attempt, max_attempts, last_error
            );
            if attempt < max_attempts {
                tokio::time::sleep(self.retry.delay * attempt).await;
            }
        }

        Err(SaveError::RemoteExhausted {
            attempts: max_attempts,
            last: last_error,
        })
    }

    /// Removes pending entries covered by a confirmed batch.
    ///
    /// Edits queued after the commit started are newer than the batch and stay.
    fn clear_confirmed(&self, fields: &[String], seq_at_start: u64) {
        self.lock_queue()
            .entries
            .retain(|q| q.seq >= seq_at_start || !fields.contains(&q.change.field));
    }
}

/// Keeps the last change per field, preserving first-seen order.
fn dedupe(changes: Vec<PendingChange>) -> Vec<PendingChange> {
    let mut out: Vec<PendingChange> = Vec::with_capacity(changes.len());
    for change in changes {
        match out.iter_mut().find(|c| c.field == change.field) {
            Some(existing) => *existing = change,
            None => out.push(change),
        }
    }
    out
}
