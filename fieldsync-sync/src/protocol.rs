//! Host message protocol.
//!
//! Messages are JSON objects tagged by `type`. Inbound messages form a closed
//! set: anything outside it is rejected at the boundary with a
//! [`ProtocolError`] and never reaches the rest of the engine.

use crate::error::ProtocolError;
use fieldsync_types::{now_millis, BatchId, ContentField, Millis, PendingChange};
use serde::{Deserialize, Serialize};

/// Inbound `type` tags understood by the bridge.
pub const INBOUND_TYPES: [&str; 6] = [
    "connection-test",
    "enable-editing",
    "disable-editing",
    "content-changed",
    "apply-saved-changes",
    "refresh-content",
];

/// One saved field as exchanged with the host and the save endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field_name: String,
    pub field_value: String,
}

impl FieldChange {
    pub fn new(field_name: impl Into<String>, field_value: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            field_value: field_value.into(),
        }
    }
}

impl From<&PendingChange> for FieldChange {
    fn from(change: &PendingChange) -> Self {
        Self::new(change.field.clone(), change.value.clone())
    }
}

impl From<&FieldChange> for PendingChange {
    fn from(change: &FieldChange) -> Self {
        PendingChange::new(change.field_name.clone(), change.field_value.clone())
    }
}

/// Messages the host sends to the frontend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundMessage {
    /// Handshake probe; answered with the capability descriptor.
    ConnectionTest,
    /// Turn editing mode on.
    EnableEditing,
    /// Turn editing mode off.
    DisableEditing,
    /// Draft value typed in the host, for live preview only.
    ContentChanged { field: String, value: String },
    /// The host durably saved these fields.
    ApplySavedChanges {
        #[serde(rename = "savedChanges")]
        saved_changes: Vec<FieldChange>,
    },
    /// Run a refresh now.
    RefreshContent,
}

impl InboundMessage {
    /// Parses and validates a message payload.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProtocolError> {
        let kind = value
            .get("type")
            .ok_or_else(|| ProtocolError::Malformed("missing `type`".to_string()))?
            .as_str()
            .ok_or_else(|| ProtocolError::Malformed("`type` is not a string".to_string()))?;
        if !INBOUND_TYPES.contains(&kind) {
            return Err(ProtocolError::UnknownType(kind.to_string()));
        }

        let message: Self = serde_json::from_value(value)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        message.validate()?;
        Ok(message)
    }

    /// Parses a raw JSON string.
    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }

    /// The message's `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionTest => "connection-test",
            Self::EnableEditing => "enable-editing",
            Self::DisableEditing => "disable-editing",
            Self::ContentChanged { .. } => "content-changed",
            Self::ApplySavedChanges { .. } => "apply-saved-changes",
            Self::RefreshContent => "refresh-content",
        }
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        let check = |key: &str| {
            ContentField::validate_key(key).map_err(|_| ProtocolError::InvalidField(key.to_string()))
        };
        match self {
            Self::ContentChanged { field, .. } => check(field),
            Self::ApplySavedChanges { saved_changes } => saved_changes
                .iter()
                .try_for_each(|change| check(&change.field_name)),
            _ => Ok(()),
        }
    }
}

/// Messages the frontend sends to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundMessage {
    /// Handshake, retried until the host answers.
    IframeReady {
        capabilities: Vec<String>,
        timestamp: Millis,
    },
    /// Reply to `connection-test`.
    ConnectionOk {
        capabilities: Vec<String>,
        timestamp: Millis,
    },
    /// Acknowledges a commit.
    ContentSaved {
        fields: Vec<String>,
        success: bool,
        #[serde(rename = "batchId", default, skip_serializing_if = "Option::is_none")]
        batch_id: Option<BatchId>,
    },
    /// A fatal save error.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
}

impl OutboundMessage {
    pub fn iframe_ready(capabilities: &[String]) -> Self {
        Self::IframeReady {
            capabilities: capabilities.to_vec(),
            timestamp: now_millis(),
        }
    }

    pub fn connection_ok(capabilities: &[String]) -> Self {
        Self::ConnectionOk {
            capabilities: capabilities.to_vec(),
            timestamp: now_millis(),
        }
    }

    pub fn error(message: impl Into<String>, details: Option<serde_json::Value>) -> Self {
        Self::Error {
            message: message.into(),
            details,
        }
    }

    /// The message's `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IframeReady { .. } => "iframe-ready",
            Self::ConnectionOk { .. } => "connection-ok",
            Self::ContentSaved { .. } => "content-saved",
            Self::Error { .. } => "error",
        }
    }
}

/// A message together with the origin it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub origin: String,
    pub data: serde_json::Value,
}
