//! Host message bridge.
//!
//! Every inbound payload passes the origin allow-list and protocol validation
//! before anything else looks at it. Rejected messages are dropped with a
//! debug log and never answered.

use crate::channel::HostChannel;
use crate::config::BridgeConfig;
use crate::coordinator::{CommitOrigin, CommitReport, SaveCoordinator};
use crate::error::{ProtocolError, SaveError};
use crate::protocol::{InboundMessage, OutboundMessage};
use crate::scheduler::{SyncScheduler, Trigger};
use crate::store::ContentStore;
use fieldsync_types::PendingChange;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Routes host messages to the engine and answers them.
pub struct MessageBridge {
    config: BridgeConfig,
    channel: Arc<dyn HostChannel>,
    store: Arc<ContentStore>,
    coordinator: Arc<SaveCoordinator>,
    scheduler: Arc<SyncScheduler>,
    triggers: mpsc::Sender<Trigger>,
    editing: watch::Sender<bool>,
    acked: watch::Sender<bool>,
}

impl MessageBridge {
    pub fn new(
        config: BridgeConfig,
        channel: Arc<dyn HostChannel>,
        store: Arc<ContentStore>,
        coordinator: Arc<SaveCoordinator>,
        scheduler: Arc<SyncScheduler>,
        triggers: mpsc::Sender<Trigger>,
    ) -> Self {
        Self {
            config,
            channel,
            store,
            coordinator,
            scheduler,
            triggers,
            editing: watch::channel(false).0,
            acked: watch::channel(false).0,
        }
    }

    /// Watches the editing flag.
    pub fn editing_mode(&self) -> watch::Receiver<bool> {
        self.editing.subscribe()
    }

    pub fn is_editing(&self) -> bool {
        *self.editing.borrow()
    }

    /// Whether the host has acknowledged the handshake.
    pub fn is_connected(&self) -> bool {
        *self.acked.borrow()
    }

    /// Validates and dispatches one inbound payload.
    ///
    /// Returns the accepted message kind, or the reason it was dropped.
    pub async fn handle(
        &self,
        origin: &str,
        data: serde_json::Value,
    ) -> Result<&'static str, ProtocolError> {
        let message = self.accept(origin, data).inspect_err(|e| {
            debug!("Dropping host message: {}", e);
        })?;
        let kind = message.kind();

        if !self.acked.send_replace(true) {
            info!("Host connected ({})", origin);
        }

        match message {
            InboundMessage::ConnectionTest => {
                self.post(OutboundMessage::connection_ok(&self.config.capabilities))
                    .await;
            }
            InboundMessage::EnableEditing => self.set_editing(true),
            InboundMessage::DisableEditing => self.set_editing(false),
            InboundMessage::ContentChanged { field, value } => {
                self.store.preview(field, value);
            }
            InboundMessage::ApplySavedChanges { saved_changes } => {
                let changes: Vec<PendingChange> =
                    saved_changes.iter().map(PendingChange::from).collect();
                let result = self.coordinator.commit(changes, CommitOrigin::Host).await;
                self.report_commit(&result).await;
            }
            InboundMessage::RefreshContent => {
                if self.triggers.send(Trigger::HostRequest).await.is_err() {
                    debug!("Sync loop is gone, ignoring refresh request");
                }
            }
        }
        Ok(kind)
    }

    fn accept(&self, origin: &str, data: serde_json::Value) -> Result<InboundMessage, ProtocolError> {
        if !self.config.is_trusted_origin(origin) {
            return Err(ProtocolError::UntrustedOrigin(origin.to_string()));
        }
        InboundMessage::from_value(data)
    }

    fn set_editing(&self, enabled: bool) {
        let previous = self.editing.send_replace(enabled);
        if previous != enabled {
            debug!("Editing mode {}", if enabled { "on" } else { "off" });
        }
    }

    /// Tells the host how a commit ended.
    ///
    /// A confirmed commit is answered with `content-saved`; a failed one with
    /// `error`. An empty batch is not acknowledged.
    pub async fn report_commit(&self, result: &Result<CommitReport, SaveError>) {
        let message = match result {
            Ok(report) if report.fields.is_empty() => {
                debug!("Empty batch {}, nothing to acknowledge", report.batch_id);
                return;
            }
            Ok(report) => {
                self.scheduler.record_save();
                OutboundMessage::ContentSaved {
                    fields: report.fields.clone(),
                    success: true,
                    batch_id: Some(report.batch_id),
                }
            }
            Err(e) => {
                warn!("Save failed: {}", e);
                let details = match e {
                    SaveError::Persistence(_) => serde_json::json!({ "stage": "persistence" }),
                    SaveError::RemoteExhausted { attempts, .. } => {
                        serde_json::json!({ "stage": "remote", "attempts": attempts })
                    }
                };
                OutboundMessage::error(e.to_string(), Some(details))
            }
        };
        self.post(message).await;
    }

    /// Sends `iframe-ready` and repeats it on the handshake schedule until the
    /// host answers.
    ///
    /// Returns true once acknowledged, false when the schedule ran out.
    pub async fn announce_ready(&self) -> bool {
        let mut acked = self.acked.subscribe();
        let schedule = self.config.handshake_schedule();

        self.post(OutboundMessage::iframe_ready(&self.config.capabilities))
            .await;
        for (attempt, delay) in schedule.iter().enumerate() {
            if wait_for_ack(&mut acked, *delay).await {
                return true;
            }
            debug!(
                "No handshake reply after {:?}, resending iframe-ready (retry {})",
                delay,
                attempt + 1
            );
            self.post(OutboundMessage::iframe_ready(&self.config.capabilities))
                .await;
        }

        let acknowledged = *acked.borrow();
        if !acknowledged {
            warn!(
                "Host never acknowledged the handshake after {} retries",
                schedule.len()
            );
        }
        acknowledged
    }

    async fn post(&self, message: OutboundMessage) {
        if let Err(e) = self.channel.post(&message).await {
            warn!("Failed to post {} to host: {}", message.kind(), e);
        }
    }
}

async fn wait_for_ack(acked: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    matches!(timeout(delay, acked.wait_for(|ok| *ok)).await, Ok(Ok(_)))
}
