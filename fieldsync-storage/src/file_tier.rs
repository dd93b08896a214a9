//! Fast durable tier backed by one JSON file per origin.
//!
//! Writes go to a temporary file first and are renamed into place, so a crash
//! mid-write leaves either the old snapshot or the new one, never half of each.

use crate::error::{TierError, TierResult};
use crate::tier::{check_quota, decode_blob, encode_blob, StorageTier, TierKind};
use async_trait::async_trait;
use fieldsync_types::ContentSnapshot;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Stores the snapshot for one origin as `<dir>/<origin>.json`.
pub struct FileTier {
    path: PathBuf,
    quota: Option<usize>,
}

impl FileTier {
    /// Creates a file tier for `origin` under `dir`.
    pub fn new(dir: impl AsRef<Path>, origin: &str) -> Self {
        let file_name = format!("{}.json", sanitize_origin(origin));
        Self {
            path: dir.as_ref().join(file_name),
            quota: None,
        }
    }

    /// Limits the blob size this tier accepts.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

/// Maps an origin such as `https://cms.example.com:8443` to a file-name-safe key.
fn sanitize_origin(origin: &str) -> String {
    let key: String = origin
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    if key.is_empty() { "default".to_string() } else { key }
}

#[async_trait]
impl StorageTier for FileTier {
    fn kind(&self) -> TierKind {
        TierKind::FastDurable
    }

    async fn save(&self, snapshot: &ContentSnapshot) -> TierResult<()> {
        let blob = encode_blob(snapshot)?;
        check_quota(self.kind(), self.quota, blob.len())?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| TierError::Unavailable {
                tier: self.kind(),
                reason: format!("failed to create {}: {e}", parent.display()),
            })?;
        }

        let tmp = self.temp_path();
        fs::write(&tmp, blob.as_bytes()).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!("Wrote snapshot v{} to {}", snapshot.version, self.path.display());
        Ok(())
    }

    async fn load(&self) -> TierResult<Option<ContentSnapshot>> {
        match fs::read_to_string(&self.path).await {
            Ok(blob) => decode_blob(self.kind(), &blob).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) {
        match fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to clear {}: {}", self.path.display(), e),
        }
    }
}
