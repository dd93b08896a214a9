//! Remote content API client.
//!
//! `GET <content_endpoint>` returns the full content map; `POST
//! <save_endpoint>` accepts a batch of field changes. The trait keeps the
//! scheduler and the save coordinator independent of HTTP.

use crate::config::RemoteConfig;
use crate::error::{SyncError, SyncResult};
use crate::protocol::FieldChange;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Body of a save request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveRequest {
    pub changes: Vec<FieldChange>,
}

/// Answer of the save endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Access to the remote content host.
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Fetches the full current content map.
    async fn fetch_content(&self) -> SyncResult<BTreeMap<String, String>>;

    /// Submits a batch of changes.
    async fn save_changes(&self, changes: &[FieldChange]) -> SyncResult<SaveResponse>;
}

/// HTTP implementation of [`ContentApi`].
///
/// No request timeout is set on the client; the scheduler and the save
/// coordinator bound each call with their own configured timeout.
pub struct HttpContentApi {
    config: RemoteConfig,
    client: Client,
}

impl HttpContentApi {
    /// Creates a client for the configured endpoints.
    pub fn new(config: RemoteConfig) -> SyncResult<Self> {
        if config.content_endpoint.is_empty() {
            return Err(SyncError::Config("content endpoint is not set".to_string()));
        }
        let client = Client::builder()
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }
}

/// Converts a JSON object into a content map.
///
/// Scalars are stringified, `null` and nested values are skipped.
pub fn parse_content_map(body: serde_json::Value) -> SyncResult<BTreeMap<String, String>> {
    let serde_json::Value::Object(object) = body else {
        return Err(SyncError::Malformed("expected a JSON object".to_string()));
    };

    let mut content = BTreeMap::new();
    for (key, value) in object {
        let value = match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Null => continue,
            other => {
                debug!("Skipping non-scalar content field {}: {}", key, other);
                continue;
            }
        };
        content.insert(key, value);
    }
    Ok(content)
}

#[async_trait]
impl ContentApi for HttpContentApi {
    async fn fetch_content(&self) -> SyncResult<BTreeMap<String, String>> {
        let response = self
            .client
            .get(&self.config.content_endpoint)
            .header("Cache-Control", "no-cache")
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("content fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(SyncError::Status {
                status: response.status().as_u16(),
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SyncError::Malformed(format!("failed to parse content: {e}")))?;
        parse_content_map(body)
    }

    async fn save_changes(&self, changes: &[FieldChange]) -> SyncResult<SaveResponse> {
        if self.config.save_endpoint.is_empty() {
            return Err(SyncError::Config("save endpoint is not set".to_string()));
        }

        let mut request = self.client.post(&self.config.save_endpoint).json(&SaveRequest {
            changes: changes.to_vec(),
        });
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("save failed: {e}")))?;

        if !response.status().is_success() {
            return Err(SyncError::Status {
                status: response.status().as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| SyncError::Malformed(format!("failed to parse save response: {e}")))
    }
}

/// An in-memory content API for testing.
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// How `fetch_content` behaves.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum FetchBehavior {
        /// Return the configured content.
        Respond,
        /// Fail with a network error.
        Fail,
        /// Never answer.
        Hang,
    }

    /// Scriptable [`ContentApi`].
    pub struct MockContentApi {
        content: Mutex<BTreeMap<String, String>>,
        fetch_behavior: Mutex<FetchBehavior>,
        save_failures_left: AtomicUsize,
        save_hangs_left: AtomicUsize,
        fetches: AtomicUsize,
        save_attempts: AtomicUsize,
        saved: Mutex<Vec<Vec<FieldChange>>>,
    }

    impl MockContentApi {
        pub fn new() -> Self {
            Self {
                content: Mutex::new(BTreeMap::new()),
                fetch_behavior: Mutex::new(FetchBehavior::Respond),
                save_failures_left: AtomicUsize::new(0),
                save_hangs_left: AtomicUsize::new(0),
                fetches: AtomicUsize::new(0),
                save_attempts: AtomicUsize::new(0),
                saved: Mutex::new(Vec::new()),
            }
        }

        /// Sets one remote field.
        pub fn set_field(&self, field: &str, value: &str) {
            self.content
                .lock()
                .unwrap()
                .insert(field.to_string(), value.to_string());
        }

        pub fn set_fetch_behavior(&self, behavior: FetchBehavior) {
            *self.fetch_behavior.lock().unwrap() = behavior;
        }

        /// Makes the next `n` save attempts fail.
        pub fn fail_next_saves(&self, n: usize) {
            self.save_failures_left.store(n, Ordering::SeqCst);
        }

        /// Makes the next `n` save attempts never answer.
        pub fn hang_next_saves(&self, n: usize) {
            self.save_hangs_left.store(n, Ordering::SeqCst);
        }

        pub fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        pub fn save_attempts(&self) -> usize {
            self.save_attempts.load(Ordering::SeqCst)
        }

        /// Batches that were accepted.
        pub fn saved_batches(&self) -> Vec<Vec<FieldChange>> {
            self.saved.lock().unwrap().clone()
        }
    }

    impl Default for MockContentApi {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ContentApi for MockContentApi {
        async fn fetch_content(&self) -> SyncResult<BTreeMap<String, String>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let behavior = *self.fetch_behavior.lock().unwrap();
            match behavior {
                FetchBehavior::Respond => Ok(self.content.lock().unwrap().clone()),
                FetchBehavior::Fail => Err(SyncError::Network("mock fetch failure".to_string())),
                FetchBehavior::Hang => futures::future::pending().await,
            }
        }

        async fn save_changes(&self, changes: &[FieldChange]) -> SyncResult<SaveResponse> {
            self.save_attempts.fetch_add(1, Ordering::SeqCst);
            let hanging = self
                .save_hangs_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if hanging {
                return futures::future::pending().await;
            }
            let failing = self
                .save_failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(SyncError::Status { status: 503 });
            }

            let mut content = self.content.lock().unwrap();
            for change in changes {
                content.insert(change.field_name.clone(), change.field_value.clone());
            }
            self.saved.lock().unwrap().push(changes.to_vec());
            Ok(SaveResponse {
                success: true,
                message: None,
            })
        }
    }
}
