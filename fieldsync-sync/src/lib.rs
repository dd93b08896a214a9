//! Content sync engine for fieldsync.
//!
//! Keeps an embedded rendering frontend in step with a remote content host.
//! Edits show up immediately, survive reloads through the storage tiers, and
//! are never reverted by a background refresh that raced the save.
//!
//! # Architecture
//!
//! - [`ContentStore`] holds the authoritative snapshot and notifies
//!   subscribers. Stale snapshots are rejected by version.
//! - [`SyncScheduler`] fetches the remote content map on an interval and on
//!   demand, skipping fields the [`GracePeriodGuard`] shields.
//! - [`SaveCoordinator`] applies a batch optimistically, persists it through
//!   the [`TierManager`](fieldsync_storage::TierManager) and pushes it to the
//!   remote save endpoint.
//! - [`MessageBridge`] validates host messages (origin allow-list, closed
//!   message set) and routes them.
//! - [`ContentService`] wires everything together and hands out
//!   [`ContentHandle`]s.

mod bridge;
pub mod channel;
mod config;
mod coordinator;
mod error;
mod grace;
mod protocol;
pub mod remote;
mod scheduler;
mod service;
mod store;

pub use bridge::MessageBridge;
pub use channel::{HostChannel, MpscChannel};
pub use config::{
    BridgeConfig, RemoteConfig, DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_GRACE_PERIOD_MS,
    DEFAULT_HANDSHAKE_SCHEDULE_MS, DEFAULT_SAVE_MAX_ATTEMPTS, DEFAULT_SAVE_RETRY_DELAY_MS,
    DEFAULT_SYNC_INTERVAL_MS,
};
pub use coordinator::{CommitOrigin, CommitReport, RemoteOutcome, RetryPolicy, SaveCoordinator};
pub use error::{ProtocolError, SaveError, SyncError, SyncResult};
pub use grace::{GracePeriodGuard, GracePeriodState};
pub use protocol::{Envelope, FieldChange, InboundMessage, OutboundMessage, INBOUND_TYPES};
pub use remote::{parse_content_map, ContentApi, HttpContentApi, SaveRequest, SaveResponse};
pub use scheduler::{SyncOutcome, SyncScheduler, SyncState, Trigger};
pub use service::{ContentHandle, ContentService, ContentServiceBuilder, ServiceStatus};
pub use store::{ContentEvent, ContentStore, Subscription};
