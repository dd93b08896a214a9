//! Background content refresh.
//!
//! Runs on a fixed interval and on ad hoc triggers. At most one fetch is in
//! flight at a time; a failed or timed-out fetch leaves the store untouched
//! and simply waits for the next regular tick.

use crate::error::SyncError;
use crate::grace::GracePeriodGuard;
use crate::remote::ContentApi;
use crate::store::ContentStore;
use fieldsync_storage::TierManager;
use fieldsync_types::{now_millis, Millis, PendingChange, SnapshotSource};
use serde::Serialize;
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Why a refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    /// Regular interval tick.
    Interval,
    /// First run after the service started.
    Startup,
    /// The page became visible again.
    Visible,
    /// Connectivity came back.
    Online,
    /// The host sent `refresh-content`.
    HostRequest,
}

/// Scheduler bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncState {
    pub last_sync_at: Option<Millis>,
    pub last_save_at: Option<Millis>,
    pub in_flight: bool,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

/// Result of one refresh run.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Another fetch was already in flight.
    Skipped,
    /// Nothing to apply. Lists differing fields that were shielded.
    Unchanged { shielded: Vec<String> },
    /// Remote values were applied.
    Applied {
        version: u64,
        applied: Vec<String>,
        shielded: Vec<String>,
    },
    /// The fetch failed; the store is untouched.
    Failed(SyncError),
}

impl SyncOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Periodic and event-driven fetch from the remote content endpoint.
pub struct SyncScheduler {
    api: Arc<dyn ContentApi>,
    store: Arc<ContentStore>,
    guard: Arc<GracePeriodGuard>,
    tiers: Arc<TierManager>,
    state: RwLock<SyncState>,
    interval: Duration,
    fetch_timeout: Duration,
}

/// Clears `in_flight` however the run ends, including cancellation.
struct InFlight<'a> {
    scheduler: &'a SyncScheduler,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.scheduler.lock_state().in_flight = false;
    }
}

impl SyncScheduler {
    pub fn new(
        api: Arc<dyn ContentApi>,
        store: Arc<ContentStore>,
        guard: Arc<GracePeriodGuard>,
        tiers: Arc<TierManager>,
        interval: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            api,
            store,
            guard,
            tiers,
            state: RwLock::new(SyncState::default()),
            interval,
            fetch_timeout,
        }
    }

    fn lock_state(&self) -> RwLockWriteGuard<'_, SyncState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A copy of the scheduler bookkeeping.
    pub fn state(&self) -> SyncState {
        self.lock_state().clone()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Records a confirmed save.
    pub fn record_save(&self) {
        self.lock_state().last_save_at = Some(now_millis());
    }

    /// Runs one refresh unless another is in flight.
    pub async fn run(&self, trigger: Trigger) -> SyncOutcome {
        {
            let mut state = self.lock_state();
            if state.in_flight {
                debug!("Sync already in flight, skipping {:?} trigger", trigger);
                return SyncOutcome::Skipped;
            }
            state.in_flight = true;
        }
        let _in_flight = InFlight { scheduler: self };

        debug!("Starting content sync ({:?})", trigger);
        let fetched = match timeout(self.fetch_timeout, self.api.fetch_content()).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(self.fetch_timeout)),
        };

        let outcome = match fetched {
            Ok(remote) => self.apply_remote(remote).await,
            Err(e) => {
                warn!("Content sync failed, keeping last known snapshot: {}", e);
                SyncOutcome::Failed(e)
            }
        };

        let mut state = self.lock_state();
        match &outcome {
            SyncOutcome::Failed(e) => {
                state.consecutive_failures += 1;
                state.last_error = Some(e.to_string());
            }
            _ => {
                state.last_sync_at = Some(now_millis());
                state.consecutive_failures = 0;
                state.last_error = None;
            }
        }
        outcome
    }

    /// Applies every differing, unshielded field in one new snapshot.
    async fn apply_remote(&self, remote: std::collections::BTreeMap<String, String>) -> SyncOutcome {
        let mut applied = Vec::new();
        let mut shielded = Vec::new();

        // Shield checks run under the store's write lock, so a save that lands
        // between fetch and apply is never overwritten.
        let accepted = self.store.replace_with(|current| {
            let changes: Vec<PendingChange> = current
                .diff(&remote)
                .into_iter()
                .filter_map(|diff| {
                    if self.guard.is_shielded(&diff.field) {
                        shielded.push(diff.field);
                        None
                    } else {
                        applied.push(diff.field.clone());
                        Some(PendingChange::new(diff.field, diff.remote))
                    }
                })
                .collect();
            if changes.is_empty() {
                return None;
            }
            let (next, _) = current.apply_changes(&changes, SnapshotSource::Remote);
            Some(next)
        });

        if !shielded.is_empty() {
            debug!("Kept local values for shielded fields: {:?}", shielded);
        }

        let Some(snapshot) = accepted else {
            return SyncOutcome::Unchanged { shielded };
        };

        info!(
            "Applied {} remote field(s), store at v{}",
            applied.len(),
            snapshot.version
        );
        if let Err(e) = self.tiers.save_snapshot(&snapshot).await {
            warn!("Failed to persist refreshed snapshot: {}", e);
        }

        SyncOutcome::Applied {
            version: snapshot.version,
            applied,
            shielded,
        }
    }

    /// Drives interval ticks and ad hoc triggers until the trigger channel closes.
    ///
    /// The first interval tick fires one full period after the loop starts.
    /// Triggers received during a run are dropped once it ends.
    pub async fn run_loop(self: Arc<Self>, mut triggers: mpsc::Receiver<Trigger>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let trigger = tokio::select! {
                _ = ticker.tick() => Trigger::Interval,
                received = triggers.recv() => match received {
                    Some(trigger) => trigger,
                    None => break,
                },
            };
            self.run(trigger).await;

            // Requests that arrived while the run was in flight are covered by it.
            while let Ok(skipped) = triggers.try_recv() {
                debug!("Sync already in flight, skipping {:?} trigger", skipped);
            }
        }
        debug!("Sync loop stopped");
    }
}
