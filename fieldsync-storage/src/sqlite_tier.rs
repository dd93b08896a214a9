//! Transactional tier backed by SQLite.
//!
//! The current snapshot for an origin lives under a fixed record identifier.
//! Each save also appends to a bounded history table, which makes this the
//! tier to consult when an older version has to be inspected.

use crate::error::{TierError, TierResult};
use crate::tier::{check_quota, StorageTier, StoredSnapshot, TierKind};
use async_trait::async_trait;
use fieldsync_types::ContentSnapshot;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Record identifier of the current snapshot.
pub const CURRENT_RECORD_ID: &str = "current";

/// Number of previous versions kept per origin.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// SQLite-backed snapshot store.
pub struct SqliteTier {
    conn: Arc<Mutex<Connection>>,
    origin: String,
    quota: Option<usize>,
    history_limit: usize,
}

impl SqliteTier {
    /// Opens (or creates) a database at the given path.
    pub fn open(path: impl AsRef<Path>, origin: impl Into<String>) -> TierResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, origin.into())
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory(origin: impl Into<String>) -> TierResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, origin.into())
    }

    fn with_connection(conn: Connection, origin: String) -> TierResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS content_snapshots (
                record_id TEXT NOT NULL,
                origin TEXT NOT NULL,
                version INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (record_id, origin)
            );

            CREATE TABLE IF NOT EXISTS content_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                origin TEXT NOT NULL,
                version INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_origin ON content_history (origin, id);
            ",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            origin,
            quota: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
        })
    }

    /// Limits the size of the serialized content map.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Sets how many previous versions are retained.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Returns up to `limit` stored versions, newest first.
    pub async fn history(&self, limit: usize) -> TierResult<Vec<ContentSnapshot>> {
        let origin = self.origin.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT version, timestamp, data FROM content_history
                 WHERE origin = ?1 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![origin, limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;

            let mut snapshots = Vec::new();
            for row in rows {
                let (version, timestamp, data) = row?;
                snapshots.push(decode_row(version, timestamp, &data)?);
            }
            Ok(snapshots)
        })
        .await
    }

    /// Runs a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> TierResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> TierResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| TierError::Unavailable {
                tier: TierKind::Transactional,
                reason: "connection lock poisoned".to_string(),
            })?;
            f(&mut guard)
        })
        .await
        .map_err(|e| TierError::Unavailable {
            tier: TierKind::Transactional,
            reason: format!("blocking task failed: {e}"),
        })?
    }
}

fn decode_row(version: i64, timestamp: i64, data: &str) -> TierResult<ContentSnapshot> {
    let data: BTreeMap<String, String> =
        serde_json::from_str(data).map_err(|e| TierError::Corrupted {
            tier: TierKind::Transactional,
            reason: e.to_string(),
        })?;
    Ok(StoredSnapshot {
        version: version.max(0) as u64,
        timestamp: timestamp.max(0) as u64,
        data,
    }
    .into())
}

#[async_trait]
impl StorageTier for SqliteTier {
    fn kind(&self) -> TierKind {
        TierKind::Transactional
    }

    async fn save(&self, snapshot: &ContentSnapshot) -> TierResult<()> {
        let data = serde_json::to_string(&snapshot.data)?;
        check_quota(self.kind(), self.quota, data.len())?;

        let origin = self.origin.clone();
        let version = snapshot.version as i64;
        let timestamp = snapshot.timestamp as i64;
        let history_limit = self.history_limit as i64;

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO content_snapshots (record_id, origin, version, timestamp, data)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(record_id, origin) DO UPDATE SET
                    version = excluded.version,
                    timestamp = excluded.timestamp,
                    data = excluded.data",
                params![CURRENT_RECORD_ID, origin, version, timestamp, data],
            )?;
            tx.execute(
                "INSERT INTO content_history (origin, version, timestamp, data)
                 VALUES (?1, ?2, ?3, ?4)",
                params![origin, version, timestamp, data],
            )?;
            tx.execute(
                "DELETE FROM content_history WHERE origin = ?1 AND id NOT IN (
                    SELECT id FROM content_history WHERE origin = ?1
                    ORDER BY id DESC LIMIT ?2
                 )",
                params![origin, history_limit],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await?;

        debug!("Committed snapshot v{} to SQLite", snapshot.version);
        Ok(())
    }

    async fn load(&self) -> TierResult<Option<ContentSnapshot>> {
        let origin = self.origin.clone();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT version, timestamp, data FROM content_snapshots
                     WHERE record_id = ?1 AND origin = ?2",
                    params![CURRENT_RECORD_ID, origin],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()?;

            row.map(|(version, timestamp, data)| decode_row(version, timestamp, &data))
                .transpose()
        })
        .await
    }

    async fn clear(&self) {
        let origin = self.origin.clone();
        let result = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM content_snapshots WHERE origin = ?1",
                    params![origin],
                )?;
                tx.execute("DELETE FROM content_history WHERE origin = ?1", params![origin])?;
                tx.commit()?;
                Ok(())
            })
            .await;
        if let Err(e) = result {
            warn!("Failed to clear SQLite tier: {}", e);
        }
    }
}
