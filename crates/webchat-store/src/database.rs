// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management: WAL mode, embedded migrations, and the
//! single writer connection every query goes through.
//!
//! All writes are serialized through `tokio-rusqlite`'s single background
//! thread. Callers should not open a second `rusqlite::Connection` onto the
//! same file for writes -- that would race WAL checkpoints with the one
//! writer this module owns.

use tokio_rusqlite::Connection;
use tracing::debug;
use webchat_core::WebchatError;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Maps a `tokio_rusqlite` error (itself wrapping either a `rusqlite::Error`
/// or a closure panic) into the crate's error taxonomy.
pub fn map_tokio_rusqlite_err(err: tokio_rusqlite::Error) -> WebchatError {
    WebchatError::Storage(format!("sqlite backend error: {err}"))
}

/// An opened, migrated, WAL-mode SQLite database handle.
pub struct Database {
    connection: Connection,
}

impl Database {
    /// Opens (creating if absent) the database file at `path`, enables WAL
    /// mode, and runs every pending embedded migration.
    pub async fn open(path: &str) -> Result<Self, WebchatError> {
        let connection = Connection::open(path)
            .await
            .map_err(map_tokio_rusqlite_err)?;

        connection
            .call(|conn| {
                conn.pragma_update(None, "journal_mode", "WAL")?;
                conn.pragma_update(None, "foreign_keys", "ON")?;
                embedded::migrations::runner()
                    .run(conn)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                Ok(())
            })
            .await
            .map_err(map_tokio_rusqlite_err)?;

        debug!(%path, "sqlite store opened and migrated");
        Ok(Self { connection })
    }

    /// Opens an in-memory database, mainly for tests that don't want a
    /// temp-file fixture but still want real SQL semantics.
    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self, WebchatError> {
        let connection = Connection::open_in_memory()
            .await
            .map_err(map_tokio_rusqlite_err)?;
        connection
            .call(|conn| {
                embedded::migrations::runner()
                    .run(conn)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                Ok(())
            })
            .await
            .map_err(map_tokio_rusqlite_err)?;
        Ok(Self { connection })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Checkpoints the WAL file, flushing it back into the main database
    /// file. Called on graceful shutdown.
    pub async fn checkpoint(&self) -> Result<(), WebchatError> {
        self.connection
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tokio_rusqlite_err)
    }
}
