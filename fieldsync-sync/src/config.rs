//! Runtime configuration.
//!
//! Every timing constant the bridge uses is a named field here; nothing else
//! in the crate hard-codes an interval.

use crate::coordinator::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default interval between background refreshes (ms).
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 60_000;
/// Default timeout for one content fetch (ms).
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;
/// Default timeout for one remote save attempt (ms).
pub const DEFAULT_SAVE_TIMEOUT_MS: u64 = DEFAULT_FETCH_TIMEOUT_MS;
/// Default grace period after a save (ms). Longer than typical CDN propagation.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 30_000;
/// Default number of remote save attempts.
pub const DEFAULT_SAVE_MAX_ATTEMPTS: u32 = 3;
/// Default base delay of the linear save backoff (ms).
pub const DEFAULT_SAVE_RETRY_DELAY_MS: u64 = 1_000;
/// Default delays between `iframe-ready` retries (ms).
pub const DEFAULT_HANDSHAKE_SCHEDULE_MS: [u64; 5] = [500, 1_000, 2_000, 3_000, 5_000];

/// Remote content API endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// `GET` endpoint returning the full content map.
    pub content_endpoint: String,
    /// `POST` endpoint accepting `{changes: [...]}`.
    pub save_endpoint: String,
    /// Service credential sent as a bearer token on saves.
    pub api_token: Option<String>,
}

/// Configuration for the content bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Storage namespace for this deployment (one blob per origin).
    pub origin: String,
    /// Hosts allowed to send messages.
    pub allowed_origins: Vec<String>,
    /// Remote API endpoints.
    pub remote: RemoteConfig,
    /// Background refresh interval (ms).
    pub sync_interval_ms: u64,
    /// Content fetch timeout (ms).
    pub fetch_timeout_ms: u64,
    /// Grace period after a save (ms).
    pub grace_period_ms: u64,
    /// Remote save attempts before giving up.
    pub save_max_attempts: u32,
    /// Base delay of the linear save backoff (ms).
    pub save_retry_delay_ms: u64,
    /// Timeout of one remote save attempt (ms).
    pub save_timeout_ms: u64,
    /// Delays between handshake retries (ms).
    pub handshake_schedule_ms: Vec<u64>,
    /// Capabilities announced to the host.
    pub capabilities: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            origin: "default".to_string(),
            allowed_origins: Vec::new(),
            remote: RemoteConfig::default(),
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            save_max_attempts: DEFAULT_SAVE_MAX_ATTEMPTS,
            save_retry_delay_ms: DEFAULT_SAVE_RETRY_DELAY_MS,
            save_timeout_ms: DEFAULT_SAVE_TIMEOUT_MS,
            handshake_schedule_ms: DEFAULT_HANDSHAKE_SCHEDULE_MS.to_vec(),
            capabilities: default_capabilities(),
        }
    }
}

fn default_capabilities() -> Vec<String> {
    [
        "content-sync",
        "live-preview",
        "editing-mode",
        "apply-saved-changes",
        "refresh-content",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl BridgeConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn save_retry_delay(&self) -> Duration {
        Duration::from_millis(self.save_retry_delay_ms)
    }

    pub fn save_timeout(&self) -> Duration {
        Duration::from_millis(self.save_timeout_ms)
    }

    /// Retry policy for frontend-initiated saves.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.save_max_attempts,
            delay: self.save_retry_delay(),
            attempt_timeout: self.save_timeout(),
        }
    }

    pub fn handshake_schedule(&self) -> Vec<Duration> {
        self.handshake_schedule_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    /// Returns whether a message sender is on the allow-list.
    pub fn is_trusted_origin(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/');
        self.allowed_origins
            .iter()
            .any(|allowed| allowed.trim_end_matches('/') == origin)
    }
}
