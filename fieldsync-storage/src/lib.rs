//! Tiered snapshot persistence for fieldsync.
//!
//! Every accepted content snapshot is written to several independent storage
//! tiers so that losing one mechanism (quota eviction, a corrupted file, a
//! session that ended) never loses the content.
//!
//! # Architecture
//!
//! - [`StorageTier`] is the uniform save/load contract. Tier failures are
//!   always returned as [`TierError`], never panics.
//! - [`FileTier`] is the fast durable tier: one JSON document per origin.
//! - [`SessionTier`] lives exactly as long as the process.
//! - [`SqliteTier`] is the transactional tier, with a bounded version history.
//! - [`TierManager`] writes to every tier concurrently and reads back the
//!   snapshot with the highest version.
//!
//! All tiers store the same blob shape: `{version, timestamp, data}`.

mod error;
mod file_tier;
mod manager;
pub mod mock;
mod session_tier;
mod sqlite_tier;
mod tier;

pub use error::{StorageError, StorageResult, TierError, TierResult};
pub use file_tier::FileTier;
pub use manager::{TierManager, TierReport};
pub use session_tier::SessionTier;
pub use sqlite_tier::{SqliteTier, CURRENT_RECORD_ID, DEFAULT_HISTORY_LIMIT};
pub use tier::{decode_blob, encode_blob, StorageTier, StoredSnapshot, TierKind};
