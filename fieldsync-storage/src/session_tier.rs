//! Session-scoped tier.
//!
//! Holds the serialized blob in process memory, so its contents end with the
//! session. It still goes through the blob codec and quota check so that it
//! behaves like the other tiers at the boundary.

use crate::error::{TierError, TierResult};
use crate::tier::{check_quota, decode_blob, encode_blob, StorageTier, TierKind};
use async_trait::async_trait;
use fieldsync_types::ContentSnapshot;
use std::sync::RwLock;

#[derive(Default)]
pub struct SessionTier {
    blob: RwLock<Option<String>>,
    quota: Option<usize>,
}

impl SessionTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits the blob size this tier accepts.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    fn poisoned(&self) -> TierError {
        TierError::Unavailable {
            tier: self.kind(),
            reason: "session store lock poisoned".to_string(),
        }
    }
}

#[async_trait]
impl StorageTier for SessionTier {
    fn kind(&self) -> TierKind {
        TierKind::Session
    }

    async fn save(&self, snapshot: &ContentSnapshot) -> TierResult<()> {
        let blob = encode_blob(snapshot)?;
        check_quota(self.kind(), self.quota, blob.len())?;
        *self.blob.write().map_err(|_| self.poisoned())? = Some(blob);
        Ok(())
    }

    async fn load(&self) -> TierResult<Option<ContentSnapshot>> {
        let guard = self.blob.read().map_err(|_| self.poisoned())?;
        guard
            .as_deref()
            .map(|blob| decode_blob(self.kind(), blob))
            .transpose()
    }

    async fn clear(&self) {
        if let Ok(mut guard) = self.blob.write() {
            *guard = None;
        }
    }
}
