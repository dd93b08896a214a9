//! Wall-clock helpers.
//!
//! Snapshot timestamps and queue times are plain milliseconds since the Unix
//! epoch so they serialize as integers in every storage tier.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type Millis = u64;

/// Returns the current wall-clock time in milliseconds.
///
/// A clock set before the epoch reads as `0` rather than failing.
#[must_use]
pub fn now_millis() -> Millis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
