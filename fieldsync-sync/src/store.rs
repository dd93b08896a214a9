//! The authoritative content map.
//!
//! `ContentStore` is the single writer visible to rendering consumers. Every
//! mutation goes through the version check in [`ContentStore::replace_with`],
//! so a snapshot older than the current one can never be applied, whichever
//! path it arrives on.

use fieldsync_types::{ContentSnapshot, PendingChange, SnapshotSource};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::debug;

/// A change delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEvent {
    /// A new snapshot was accepted.
    Replaced { version: u64, changed: Vec<String> },
    /// A draft value arrived for live preview. Not committed.
    Preview { field: String, value: String },
}

type Listener = Arc<dyn Fn(&ContentEvent) + Send + Sync>;
type Listeners = RwLock<Vec<(u64, Listener)>>;

struct State {
    snapshot: ContentSnapshot,
    previews: HashMap<String, String>,
}

/// In-memory content map with change notification.
pub struct ContentStore {
    state: RwLock<State>,
    listeners: Arc<Listeners>,
    next_listener_id: AtomicU64,
}

/// Keeps a listener registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    /// Removes the listener.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            write_lock(&listeners).retain(|(id, _)| *id != self.id);
        }
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ContentStore {
    /// Creates a store holding the empty default snapshot.
    pub fn new() -> Self {
        Self::with_snapshot(ContentSnapshot::empty())
    }

    /// Creates a store holding `snapshot`.
    pub fn with_snapshot(snapshot: ContentSnapshot) -> Self {
        Self {
            state: RwLock::new(State {
                snapshot,
                previews: HashMap::new(),
            }),
            listeners: Arc::new(RwLock::new(Vec::new())),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Returns a field's committed value, or `fallback` when absent.
    pub fn get(&self, field: &str, fallback: &str) -> String {
        read_lock(&self.state)
            .snapshot
            .get(field)
            .unwrap_or(fallback)
            .to_string()
    }

    /// Returns the live preview for a field, falling back to the committed value.
    pub fn get_preview(&self, field: &str, fallback: &str) -> String {
        let state = read_lock(&self.state);
        state
            .previews
            .get(field)
            .map(String::as_str)
            .or_else(|| state.snapshot.get(field))
            .unwrap_or(fallback)
            .to_string()
    }

    /// A copy of the current snapshot.
    pub fn snapshot(&self) -> ContentSnapshot {
        read_lock(&self.state).snapshot.clone()
    }

    /// Current snapshot version.
    pub fn version(&self) -> u64 {
        read_lock(&self.state).snapshot.version
    }

    /// Registers a listener invoked on every accepted change.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ContentEvent) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        write_lock(&self.listeners).push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Number of registered listeners.
    pub fn subscriber_count(&self) -> usize {
        read_lock(&self.listeners).len()
    }

    /// Replaces the snapshot. A snapshot ordered before the current one is a no-op.
    ///
    /// Returns true when the snapshot was accepted.
    pub fn replace(&self, snapshot: ContentSnapshot) -> bool {
        self.replace_with(|_| Some(snapshot)).is_some()
    }

    /// Computes a replacement from the current snapshot while holding the write lock.
    ///
    /// Returns the accepted snapshot, or `None` when `f` declined or produced a
    /// stale snapshot.
    pub fn replace_with<F>(&self, f: F) -> Option<ContentSnapshot>
    where
        F: FnOnce(&ContentSnapshot) -> Option<ContentSnapshot>,
    {
        let (accepted, changed) = {
            let mut state = write_lock(&self.state);
            let next = f(&state.snapshot)?;
            if state.snapshot.supersedes(&next) {
                debug!(
                    "Ignoring stale snapshot v{} (store at v{})",
                    next.version, state.snapshot.version
                );
                return None;
            }

            let changed = changed_fields(&state.snapshot, &next);
            for field in &changed {
                state.previews.remove(field);
            }
            state.snapshot = next.clone();
            (next, changed)
        };

        if !changed.is_empty() {
            self.notify(&ContentEvent::Replaced {
                version: accepted.version,
                changed,
            });
        }
        Some(accepted)
    }

    /// Applies changes on top of the current snapshot.
    ///
    /// Previews for the touched fields are dropped even when the committed
    /// value did not change. Returns the snapshot the store now holds.
    pub fn apply_changes(&self, changes: &[PendingChange], source: SnapshotSource) -> ContentSnapshot {
        {
            let mut state = write_lock(&self.state);
            for change in changes {
                state.previews.remove(&change.field);
            }
        }
        let mut result = None;
        self.replace_with(|current| {
            let (next, changed) = current.apply_changes(changes, source);
            if changed.is_empty() {
                result = Some(current.clone());
                None
            } else {
                Some(next)
            }
        })
        .or(result)
        .unwrap_or_else(|| self.snapshot())
    }

    /// Records a draft value for live preview and notifies subscribers.
    pub fn preview(&self, field: impl Into<String>, value: impl Into<String>) {
        let field = field.into();
        let value = value.into();
        write_lock(&self.state)
            .previews
            .insert(field.clone(), value.clone());
        self.notify(&ContentEvent::Preview { field, value });
    }

    /// Drops all live previews.
    pub fn clear_previews(&self) {
        write_lock(&self.state).previews.clear();
    }

    fn notify(&self, event: &ContentEvent) {
        // Listeners run without any store lock held so they may read the store.
        let listeners: Vec<Listener> = read_lock(&self.listeners)
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn changed_fields(old: &ContentSnapshot, new: &ContentSnapshot) -> Vec<String> {
    let keys: BTreeSet<&String> = old.data.keys().chain(new.data.keys()).collect();
    keys.into_iter()
        .filter(|key| old.data.get(*key) != new.data.get(*key))
        .cloned()
        .collect()
}
