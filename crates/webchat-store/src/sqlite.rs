// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A durable, SQLite-backed implementation of [`PersistentStore`].
//!
//! Used when the configuration selects `StorageKind::Local`: the session
//! record and cached entries survive a process restart. Every write goes
//! through [`database::Database`]'s single writer connection; quota
//! eviction runs as a `DELETE ... LIMIT` against the same connection before
//! the write is retried, so the eviction and the retry never race another
//! writer.

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};
use webchat_core::WebchatError;

use crate::database::{map_tokio_rusqlite_err, Database};
use crate::envelope::{encode_ref, Envelope};
use crate::{namespaced, PersistentStore, NAMESPACE_PREFIX};

/// Default quota, in entries, before [`SqliteStore::set`] starts evicting.
pub const DEFAULT_CAPACITY: usize = 1024;

pub struct SqliteStore {
    db: Database,
    capacity: usize,
}

impl SqliteStore {
    /// Opens (creating if absent) the database file at `path`.
    pub async fn open(path: &str) -> Result<Self, WebchatError> {
        Self::open_with_capacity(path, DEFAULT_CAPACITY).await
    }

    pub async fn open_with_capacity(path: &str, capacity: usize) -> Result<Self, WebchatError> {
        let db = Database::open(path).await?;
        Ok(Self { db, capacity })
    }

    /// Flushes the WAL back into the main database file. Call on graceful
    /// shutdown.
    pub async fn checkpoint(&self) -> Result<(), WebchatError> {
        self.db.checkpoint().await
    }

    /// Counts entries under [`NAMESPACE_PREFIX`] and, if at or over
    /// capacity, deletes the oldest 25% (by envelope timestamp, extracted
    /// via SQLite's own `json_extract` rather than round-tripping through
    /// Rust). Returns the number of rows evicted.
    async fn evict_if_at_capacity(&self) -> Result<usize, WebchatError> {
        let capacity = self.capacity;
        let like_pattern = format!("{NAMESPACE_PREFIX}%");

        self.db
            .connection()
            .call(move |conn| {
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM kv_entries WHERE key LIKE ?1",
                    params![like_pattern],
                    |row| row.get(0),
                )?;

                if (total as usize) < capacity {
                    return Ok(0);
                }

                let evict_count = ((total as usize) / 4).max(1);
                conn.execute(
                    "DELETE FROM kv_entries WHERE key IN (
                        SELECT key FROM kv_entries
                        WHERE key LIKE ?1
                        ORDER BY timestamp ASC
                        LIMIT ?2
                    )",
                    params![like_pattern, evict_count as i64],
                )?;
                Ok(evict_count)
            })
            .await
            .map_err(map_tokio_rusqlite_err)
    }
}

#[async_trait]
impl PersistentStore for SqliteStore {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, WebchatError> {
        let key = namespaced(key);
        let query_key = key.clone();
        let raw: Option<String> = self
            .db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT value FROM kv_entries WHERE key = ?1",
                    params![query_key],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tokio_rusqlite_err)?;

        match raw {
            Some(raw) => match Envelope::<T>::from_json(&raw) {
                Ok(envelope) => Ok(Some(envelope.data)),
                Err(err) => {
                    warn!(%key, %err, "discarding entry that failed to parse");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        timestamp: i64,
    ) -> Result<(), WebchatError> {
        let key = namespaced(key);
        let raw = encode_ref(value, timestamp)?;

        let already_exists = self.has(&key).await?;
        if !already_exists {
            let evicted = self.evict_if_at_capacity().await?;
            if evicted > 0 {
                debug!(evicted, capacity = self.capacity, "sqlite store quota reached, evicted oldest entries");
            }
        }

        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO kv_entries (key, timestamp, value) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET timestamp = excluded.timestamp, value = excluded.value",
                    params![key, timestamp, raw],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tokio_rusqlite_err)
    }

    async fn remove(&self, key: &str) -> Result<(), WebchatError> {
        let key = namespaced(key);
        self.db
            .connection()
            .call(move |conn| {
                conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
                Ok(())
            })
            .await
            .map_err(map_tokio_rusqlite_err)
    }

    async fn clear(&self) -> Result<(), WebchatError> {
        let like_pattern = format!("{NAMESPACE_PREFIX}%");
        self.db
            .connection()
            .call(move |conn| {
                conn.execute("DELETE FROM kv_entries WHERE key LIKE ?1", params![like_pattern])?;
                Ok(())
            })
            .await
            .map_err(map_tokio_rusqlite_err)
    }

    async fn has(&self, key: &str) -> Result<bool, WebchatError> {
        let key = namespaced(key);
        let exists: bool = self
            .db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM kv_entries WHERE key = ?1)",
                    params![key],
                    |row| row.get(0),
                )
            })
            .await
            .map_err(map_tokio_rusqlite_err)?;
        Ok(exists)
    }

    async fn keys(&self) -> Result<Vec<String>, WebchatError> {
        let like_pattern = format!("{NAMESPACE_PREFIX}%");
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT key FROM kv_entries WHERE key LIKE ?1")?;
                let rows = stmt.query_map(params![like_pattern], |row| row.get::<_, String>(0))?;
                let mut keys = Vec::new();
                for row in rows {
                    keys.push(row?);
                }
                Ok(keys)
            })
            .await
            .map_err(map_tokio_rusqlite_err)
            .map(|keys: Vec<String>| {
                keys.into_iter()
                    .map(|k| k.trim_start_matches(NAMESPACE_PREFIX).to_string())
                    .collect()
            })
    }

    async fn size(&self) -> Result<usize, WebchatError> {
        let like_pattern = format!("{NAMESPACE_PREFIX}%");
        let count: i64 = self
            .db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM kv_entries WHERE key LIKE ?1",
                    params![like_pattern],
                    |row| row.get(0),
                )
            })
            .await
            .map_err(map_tokio_rusqlite_err)?;
        Ok(count as usize)
    }
}
