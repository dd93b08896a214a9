//! HTTP API and host I/O for the fieldsync daemon.
//!
//! The daemon speaks the host protocol as JSON lines: envelopes arrive on
//! stdin and outbound messages leave on stdout. Rendering consumers read
//! content through a small read-only HTTP API.

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use fieldsync_sync::{BridgeConfig, ContentService, Envelope, OutboundMessage, ServiceStatus};
use fieldsync_types::{ContentField, ContentSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// One field as served by `/api/v1/content/{field}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FieldResponse {
    #[serde(flatten)]
    pub field: ContentField,
    /// Live preview value while the host is editing, else the committed value.
    pub preview: String,
    pub version: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn not_found(message: String) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error: message }))
}

async fn content_handler(State(service): State<Arc<ContentService>>) -> Json<ContentSnapshot> {
    Json(service.store().snapshot())
}

async fn field_handler(
    State(service): State<Arc<ContentService>>,
    Path(key): Path<String>,
) -> Result<Json<FieldResponse>, ApiError> {
    let snapshot = service.store().snapshot();
    let value = snapshot
        .get(&key)
        .ok_or_else(|| not_found(format!("unknown field: {key}")))?;
    let field = ContentField::new(key.clone(), value)
        .map_err(|e| not_found(e.to_string()))?;
    Ok(Json(FieldResponse {
        preview: service.store().get_preview(&key, value),
        version: snapshot.version,
        field,
    }))
}

async fn status_handler(State(service): State<Arc<ContentService>>) -> Json<ServiceStatus> {
    Json(service.status())
}

/// Build the HTTP API router over a running service.
pub fn build_router(service: Arc<ContentService>) -> Router {
    Router::new()
        .route("/api/v1/content", get(content_handler))
        .route("/api/v1/content/{field}", get(field_handler))
        .route("/api/v1/status", get(status_handler))
        .with_state(service)
}

/// Loads the bridge configuration, falling back to defaults without a file.
pub fn load_config(path: Option<&std::path::Path>) -> Result<BridgeConfig> {
    let Some(path) = path else {
        return Ok(BridgeConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Feeds host envelopes, one JSON object per line, into the service until EOF.
///
/// Returns the number of messages the bridge accepted.
pub async fn pump_host_messages<R>(service: &ContentService, reader: R) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut accepted = 0;
    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read host input")?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Envelope>(line) {
            Ok(envelope) => {
                if service.handle_envelope(envelope).await.is_ok() {
                    accepted += 1;
                }
            }
            Err(e) => debug!("Ignoring malformed envelope: {}", e),
        }
    }
    info!("Host input closed after {} accepted message(s)", accepted);
    Ok(accepted)
}

/// Writes outbound messages as JSON lines until the channel closes.
pub async fn write_host_messages<W>(
    mut messages: mpsc::Receiver<OutboundMessage>,
    mut writer: W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = messages.recv().await {
        let mut line = serde_json::to_vec(&message).context("Failed to encode message")?;
        line.push(b'\n');
        writer
            .write_all(&line)
            .await
            .context("Failed to write host output")?;
        writer.flush().await.context("Failed to flush host output")?;
    }
    Ok(())
}
