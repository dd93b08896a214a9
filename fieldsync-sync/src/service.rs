//! Wiring of the sync engine.
//!
//! `ContentService` owns one instance of every component and the background
//! tasks that drive them. Consumers get a cheap, cloneable [`ContentHandle`].

use crate::bridge::MessageBridge;
use crate::channel::HostChannel;
use crate::config::BridgeConfig;
use crate::coordinator::{CommitReport, SaveCoordinator};
use crate::error::{ProtocolError, SaveError, SyncError, SyncResult};
use crate::grace::{GracePeriodGuard, GracePeriodState};
use crate::protocol::Envelope;
use crate::remote::{ContentApi, HttpContentApi};
use crate::scheduler::{SyncScheduler, SyncState, Trigger};
use crate::store::{ContentEvent, ContentStore, Subscription};
use fieldsync_storage::{StorageTier, TierManager};
use fieldsync_types::ContentSnapshot;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const TRIGGER_BUFFER: usize = 16;

/// Builder for [`ContentService`].
pub struct ContentServiceBuilder {
    config: BridgeConfig,
    tiers: Vec<Arc<dyn StorageTier>>,
    api: Option<Arc<dyn ContentApi>>,
    channel: Option<Arc<dyn HostChannel>>,
}

impl ContentServiceBuilder {
    /// Adds a storage tier. Tiers are written concurrently; order only
    /// affects log output.
    pub fn tier(mut self, tier: Arc<dyn StorageTier>) -> Self {
        self.tiers.push(tier);
        self
    }

    /// Uses this API client instead of one built from `config.remote`.
    pub fn api(mut self, api: Arc<dyn ContentApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn channel(mut self, channel: Arc<dyn HostChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn build(self) -> SyncResult<ContentService> {
        let channel = self
            .channel
            .ok_or_else(|| SyncError::Config("a host channel is required".to_string()))?;
        if self.tiers.is_empty() {
            return Err(SyncError::Config("at least one storage tier is required".to_string()));
        }
        if self.config.sync_interval_ms == 0 {
            return Err(SyncError::Config("sync interval must be positive".to_string()));
        }
        let api: Arc<dyn ContentApi> = match self.api {
            Some(api) => api,
            None => Arc::new(HttpContentApi::new(self.config.remote.clone())?),
        };

        let config = self.config;
        let store = Arc::new(ContentStore::new());
        let guard = Arc::new(GracePeriodGuard::new(config.grace_period()));
        let tiers = Arc::new(TierManager::new(self.tiers));
        let scheduler = Arc::new(SyncScheduler::new(
            api.clone(),
            store.clone(),
            guard.clone(),
            tiers.clone(),
            config.sync_interval(),
            config.fetch_timeout(),
        ));
        let coordinator = Arc::new(SaveCoordinator::new(
            store.clone(),
            tiers.clone(),
            guard.clone(),
            api,
            config.retry_policy(),
        ));

        let (triggers, trigger_rx) = mpsc::channel(TRIGGER_BUFFER);
        let bridge = Arc::new(MessageBridge::new(
            config.clone(),
            channel,
            store.clone(),
            coordinator.clone(),
            scheduler.clone(),
            triggers.clone(),
        ));

        Ok(ContentService {
            config,
            store,
            guard,
            tiers,
            scheduler,
            coordinator,
            bridge,
            triggers,
            trigger_rx: Mutex::new(Some(trigger_rx)),
            tasks: Mutex::new(Vec::new()),
        })
    }
}

/// Point-in-time view of the service, served by the daemon's status route.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub origin: String,
    pub version: u64,
    pub fields: usize,
    pub editing: bool,
    pub connected: bool,
    pub pending_changes: usize,
    pub sync: SyncState,
    pub grace: GracePeriodState,
}

/// The content sync engine.
pub struct ContentService {
    config: BridgeConfig,
    store: Arc<ContentStore>,
    guard: Arc<GracePeriodGuard>,
    tiers: Arc<TierManager>,
    scheduler: Arc<SyncScheduler>,
    coordinator: Arc<SaveCoordinator>,
    bridge: Arc<MessageBridge>,
    triggers: mpsc::Sender<Trigger>,
    trigger_rx: Mutex<Option<mpsc::Receiver<Trigger>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ContentService {
    pub fn builder(config: BridgeConfig) -> ContentServiceBuilder {
        ContentServiceBuilder {
            config,
            tiers: Vec::new(),
            api: None,
            channel: None,
        }
    }

    /// Restores the best stored snapshot, then starts the sync loop and the
    /// handshake.
    ///
    /// Calling it twice is a configuration error.
    pub async fn start(&self) -> SyncResult<()> {
        let trigger_rx = self
            .trigger_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| SyncError::Config("service already started".to_string()))?;

        let restored = self.tiers.load_best().await;
        self.store.replace(restored);

        let scheduler = self.scheduler.clone();
        let sync_task = tokio::spawn(scheduler.run_loop(trigger_rx));
        let bridge = self.bridge.clone();
        let handshake_task = tokio::spawn(async move {
            bridge.announce_ready().await;
        });
        self.lock_tasks().extend([sync_task, handshake_task]);

        self.trigger(Trigger::Startup).await;
        info!(
            "Content service started for origin {} at v{}",
            self.config.origin,
            self.store.version()
        );
        Ok(())
    }

    /// Stops the background tasks. In-flight saves are not awaited.
    pub fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = self.lock_tasks().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        debug!("Content service stopped ({} task(s) aborted)", tasks.len());
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Requests a refresh outside the interval (visibility or connectivity change).
    pub async fn trigger(&self, trigger: Trigger) {
        if self.triggers.send(trigger).await.is_err() {
            debug!("Sync loop not running, dropped {:?} trigger", trigger);
        }
    }

    /// Passes one host message to the bridge.
    pub async fn handle_message(
        &self,
        origin: &str,
        data: serde_json::Value,
    ) -> Result<&'static str, ProtocolError> {
        self.bridge.handle(origin, data).await
    }

    pub async fn handle_envelope(&self, envelope: Envelope) -> Result<&'static str, ProtocolError> {
        self.handle_message(&envelope.origin, envelope.data).await
    }

    pub fn handle(&self) -> ContentHandle {
        ContentHandle {
            store: self.store.clone(),
            coordinator: self.coordinator.clone(),
            bridge: self.bridge.clone(),
        }
    }

    pub fn status(&self) -> ServiceStatus {
        let snapshot = self.store.snapshot();
        ServiceStatus {
            origin: self.config.origin.clone(),
            version: snapshot.version,
            fields: snapshot.len(),
            editing: self.bridge.is_editing(),
            connected: self.bridge.is_connected(),
            pending_changes: self.coordinator.pending().len(),
            sync: self.scheduler.state(),
            grace: self.guard.state(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ContentStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<SyncScheduler> {
        &self.scheduler
    }

    pub fn coordinator(&self) -> &Arc<SaveCoordinator> {
        &self.coordinator
    }

    pub fn bridge(&self) -> &Arc<MessageBridge> {
        &self.bridge
    }

    pub fn tiers(&self) -> &Arc<TierManager> {
        &self.tiers
    }

    pub fn guard(&self) -> &Arc<GracePeriodGuard> {
        &self.guard
    }
}

impl Drop for ContentService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Consumer-facing access to content.
#[derive(Clone)]
pub struct ContentHandle {
    store: Arc<ContentStore>,
    coordinator: Arc<SaveCoordinator>,
    bridge: Arc<MessageBridge>,
}

impl ContentHandle {
    /// Committed value of a field, or `fallback`.
    pub fn get(&self, field: &str, fallback: &str) -> String {
        self.store.get(field, fallback)
    }

    /// Live preview of a field while editing, else its committed value.
    pub fn get_preview(&self, field: &str, fallback: &str) -> String {
        self.store.get_preview(field, fallback)
    }

    pub fn snapshot(&self) -> ContentSnapshot {
        self.store.snapshot()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ContentEvent) + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }

    pub fn editing_mode(&self) -> watch::Receiver<bool> {
        self.bridge.editing_mode()
    }

    pub fn is_editing(&self) -> bool {
        self.bridge.is_editing()
    }

    /// Queues an edit without committing it.
    pub fn queue(&self, field: impl Into<String>, value: impl Into<String>) {
        self.coordinator.queue(field, value);
    }

    /// Commits everything queued and reports the result to the host.
    pub async fn flush(&self) -> Result<CommitReport, SaveError> {
        let result = self.coordinator.flush().await;
        self.bridge.report_commit(&result).await;
        result
    }

    /// Saves one field from the frontend.
    pub async fn save(
        &self,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<CommitReport, SaveError> {
        self.queue(field, value);
        self.flush().await
    }
}
