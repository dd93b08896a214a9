//! Content fields and pending local edits.

use crate::clock::{now_millis, Millis};
use crate::Error;
use serde::{Deserialize, Serialize};

/// How a field's value should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldFormat {
    /// Plain text, rendered verbatim.
    #[default]
    Plain,
    /// Markup produced by a rich-text editor.
    Rich,
}

impl FieldFormat {
    /// Classifies a value: anything containing a markup tag is rich.
    #[must_use]
    pub fn detect(value: &str) -> Self {
        let bytes = value.as_bytes();
        let has_tag = bytes.windows(2).enumerate().any(|(i, w)| {
            w[0] == b'<'
                && (w[1].is_ascii_alphabetic() || w[1] == b'/')
                && bytes[i + 1..].contains(&b'>')
        });
        if has_tag { Self::Rich } else { Self::Plain }
    }
}

/// A single editable field as seen by the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentField {
    /// Opaque identifier assigned by the rendering layer.
    pub key: String,
    /// Current value.
    pub value: String,
    /// Rendering format.
    pub format: FieldFormat,
}

impl ContentField {
    /// Creates a field, detecting its format from the value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> crate::Result<Self> {
        let key = key.into();
        Self::validate_key(&key)?;
        let value = value.into();
        let format = FieldFormat::detect(&value);
        Ok(Self { key, value, format })
    }

    /// Rejects keys that cannot address a field (empty or whitespace only).
    pub fn validate_key(key: &str) -> crate::Result<()> {
        if key.trim().is_empty() {
            return Err(Error::InvalidKey(key.to_string()));
        }
        Ok(())
    }
}

/// A local edit waiting to be committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    /// Field key.
    pub field: String,
    /// New value.
    pub value: String,
    /// When the edit was queued (ms since epoch).
    pub queued_at: Millis,
}

impl PendingChange {
    /// Creates a pending change stamped with the current time.
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            queued_at: now_millis(),
        }
    }
}
