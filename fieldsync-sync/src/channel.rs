//! Outbound channel to the host.

use crate::error::{SyncError, SyncResult};
use crate::protocol::OutboundMessage;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Delivers messages to the embedding host.
#[async_trait]
pub trait HostChannel: Send + Sync {
    async fn post(&self, message: &OutboundMessage) -> SyncResult<()>;
}

/// Forwards outbound messages into a tokio channel.
///
/// Whoever owns the receiver decides how messages reach the host (a writer
/// task, a websocket, a test).
#[derive(Clone)]
pub struct MpscChannel {
    tx: mpsc::Sender<OutboundMessage>,
}

impl MpscChannel {
    pub fn new(tx: mpsc::Sender<OutboundMessage>) -> Self {
        Self { tx }
    }

    /// Creates a channel and its receiving half.
    pub fn pair(buffer: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl HostChannel for MpscChannel {
    async fn post(&self, message: &OutboundMessage) -> SyncResult<()> {
        self.tx
            .send(message.clone())
            .await
            .map_err(|_| SyncError::ChannelClosed)
    }
}

/// A recording channel for testing.
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Keeps every posted message.
    #[derive(Default)]
    pub struct RecordingChannel {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    impl RecordingChannel {
        pub fn new() -> Self {
            Self::default()
        }

        /// All messages posted so far.
        pub fn sent(&self) -> Vec<OutboundMessage> {
            self.sent.lock().unwrap().clone()
        }

        /// Number of posted messages with the given `type` tag.
        pub fn count(&self, kind: &str) -> usize {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.kind() == kind)
                .count()
        }

        /// The most recent message with the given `type` tag.
        pub fn last(&self, kind: &str) -> Option<OutboundMessage> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|m| m.kind() == kind)
                .cloned()
        }
    }

    #[async_trait]
    impl HostChannel for RecordingChannel {
        async fn post(&self, message: &OutboundMessage) -> SyncResult<()> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }
}
