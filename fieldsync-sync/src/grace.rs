//! Grace period after a save.
//!
//! For a bounded window after a field is saved, a background refresh must not
//! overwrite it: the remote side may still be serving the previous value from
//! a cache. Each field keeps its own deadline, so saving one field never
//! extends the shield of another.
//!
//! Deadlines use `tokio::time::Instant`, so paused-clock tests can step
//! through the window.

use fieldsync_types::{now_millis, Millis};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Read-only view of the guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GracePeriodState {
    /// Whether any field is currently shielded.
    pub active: bool,
    /// Wall-clock time (ms) at which the shield lapses.
    pub expires_at: Option<Millis>,
    /// Fields currently shielded.
    pub shielded_fields: BTreeSet<String>,
}

/// Idle/Active state machine shielding recently saved fields.
///
/// Active while at least one field deadline lies in the future.
pub struct GracePeriodGuard {
    deadlines: RwLock<BTreeMap<String, Instant>>,
    default_duration: Duration,
}

impl GracePeriodGuard {
    pub fn new(default_duration: Duration) -> Self {
        Self {
            deadlines: RwLock::new(BTreeMap::new()),
            default_duration,
        }
    }

    /// The duration used by [`activate_default`](Self::activate_default).
    pub fn default_duration(&self) -> Duration {
        self.default_duration
    }

    /// Locks the deadlines, dropping every field whose deadline has been reached.
    fn lock(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Instant>> {
        let mut deadlines = self
            .deadlines
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        let before = deadlines.len();
        deadlines.retain(|_, deadline| now < *deadline);
        if deadlines.len() != before {
            debug!(
                "Grace period lapsed for {} field(s), {} still shielded",
                before - deadlines.len(),
                deadlines.len()
            );
        }
        deadlines
    }

    /// Shields `fields` for `duration` from now.
    ///
    /// A field that is already shielded keeps the later of its two deadlines.
    pub fn activate<I, S>(&self, fields: I, duration: Duration)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let deadline = Instant::now() + duration;
        let mut deadlines = self.lock();
        for field in fields {
            let entry = deadlines.entry(field.into()).or_insert(deadline);
            *entry = (*entry).max(deadline);
        }
        debug!(
            "Grace period active for {} field(s), {:?} left on the newest",
            deadlines.len(),
            duration
        );
    }

    /// Shields `fields` for the default duration.
    pub fn activate_default<I, S>(&self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.activate(fields, self.default_duration);
    }

    /// Whether a remote refresh must leave `field` alone.
    pub fn is_shielded(&self, field: &str) -> bool {
        self.lock().contains_key(field)
    }

    /// Whether the guard is Active.
    pub fn is_active(&self) -> bool {
        !self.lock().is_empty()
    }

    /// Time until the last shield lapses.
    pub fn remaining(&self) -> Option<Duration> {
        let now = Instant::now();
        self.lock()
            .values()
            .max()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Time until the shield on `field` lapses.
    pub fn remaining_for(&self, field: &str) -> Option<Duration> {
        let now = Instant::now();
        self.lock()
            .get(field)
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Returns to Idle immediately.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn state(&self) -> GracePeriodState {
        let deadlines = self.lock();
        let now = Instant::now();
        match deadlines.values().max() {
            Some(latest) => GracePeriodState {
                active: true,
                expires_at: Some(
                    now_millis() + latest.saturating_duration_since(now).as_millis() as Millis,
                ),
                shielded_fields: deadlines.keys().cloned().collect(),
            },
            None => GracePeriodState {
                active: false,
                expires_at: None,
                shielded_fields: BTreeSet::new(),
            },
        }
    }
}
