//! Tier wrappers for testing failure handling.

use crate::error::{TierError, TierResult};
use crate::tier::{StorageTier, TierKind};
use async_trait::async_trait;
use fieldsync_types::ContentSnapshot;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

/// Behavior of a [`FlakyTier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlakyMode {
    /// Delegate to the wrapped tier.
    Healthy,
    /// Every operation fails as if the mechanism did not exist.
    Unavailable,
    /// Saves succeed, loads report corruption.
    Corrupt,
}

impl FlakyMode {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Unavailable,
            2 => Self::Corrupt,
            _ => Self::Healthy,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Unavailable => 1,
            Self::Corrupt => 2,
        }
    }
}

/// Wraps a tier and lets tests switch it into a failing mode at runtime.
pub struct FlakyTier {
    inner: Arc<dyn StorageTier>,
    mode: AtomicU8,
    saves: AtomicUsize,
}

impl FlakyTier {
    pub fn new(inner: Arc<dyn StorageTier>) -> Self {
        Self {
            inner,
            mode: AtomicU8::new(FlakyMode::Healthy.as_u8()),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn set_mode(&self, mode: FlakyMode) {
        self.mode.store(mode.as_u8(), Ordering::SeqCst);
    }

    pub fn mode(&self) -> FlakyMode {
        FlakyMode::from_u8(self.mode.load(Ordering::SeqCst))
    }

    /// Number of successful saves that reached the wrapped tier.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn unavailable(&self) -> TierError {
        TierError::Unavailable {
            tier: self.inner.kind(),
            reason: "disabled by test".to_string(),
        }
    }
}

#[async_trait]
impl StorageTier for FlakyTier {
    fn kind(&self) -> TierKind {
        self.inner.kind()
    }

    async fn save(&self, snapshot: &ContentSnapshot) -> TierResult<()> {
        if self.mode() == FlakyMode::Unavailable {
            return Err(self.unavailable());
        }
        self.inner.save(snapshot).await?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> TierResult<Option<ContentSnapshot>> {
        match self.mode() {
            FlakyMode::Healthy => self.inner.load().await,
            FlakyMode::Unavailable => Err(self.unavailable()),
            FlakyMode::Corrupt => Err(TierError::Corrupted {
                tier: self.inner.kind(),
                reason: "corrupted by test".to_string(),
            }),
        }
    }

    async fn clear(&self) {
        if self.mode() != FlakyMode::Unavailable {
            self.inner.clear().await;
        }
    }
}
