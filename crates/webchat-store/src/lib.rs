// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Namespaced key/value persistence behind a single async trait.
//!
//! Two backends implement [`PersistentStore`]: [`memory::InMemoryStore`], a
//! bounded in-process map used by default and by every test in the
//! workspace, and [`sqlite::SqliteStore`], a durable backend for embedders
//! that need the session and cache to survive a process restart. Both speak
//! the same namespaced-key, versioned-envelope, quota-eviction contract, so
//! `webchat-session` and the rest of the core are written against the trait
//! alone.

pub mod database;
pub mod envelope;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use webchat_core::WebchatError;

pub use envelope::Envelope;
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Every key this crate writes is namespaced under this prefix, so a
/// durable backend sharing physical storage with an unrelated embedder
/// never collides with it.
pub const NAMESPACE_PREFIX: &str = "weni:webchat:";

/// Prefixes `key` with [`NAMESPACE_PREFIX`] unless it is already prefixed.
pub fn namespaced(key: &str) -> String {
    if key.starts_with(NAMESPACE_PREFIX) {
        key.to_string()
    } else {
        format!("{NAMESPACE_PREFIX}{key}")
    }
}

/// A namespaced, versioned-envelope key/value store.
///
/// Implementations are responsible for the quota-eviction policy: when a
/// `set` would exceed the backend's capacity, the oldest 25% of entries
/// under [`NAMESPACE_PREFIX`] (ordered by envelope timestamp) are evicted
/// and the write is retried exactly once before giving up.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Reads and decodes the value stored at `key`, or `None` if absent.
    async fn get<T: DeserializeOwned + Send + 'static>(
        &self,
        key: &str,
    ) -> Result<Option<T>, WebchatError>;

    /// Encodes and writes `value` at `key`, stamped with `timestamp`.
    async fn set<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        timestamp: i64,
    ) -> Result<(), WebchatError>;

    /// Removes the entry at `key`, if any. Not an error if absent.
    async fn remove(&self, key: &str) -> Result<(), WebchatError>;

    /// Removes every entry under [`NAMESPACE_PREFIX`].
    async fn clear(&self) -> Result<(), WebchatError>;

    /// `true` if `key` has a stored value.
    async fn has(&self, key: &str) -> Result<bool, WebchatError>;

    /// Every stored key under [`NAMESPACE_PREFIX`], with the prefix
    /// stripped back off.
    async fn keys(&self) -> Result<Vec<String>, WebchatError>;

    /// The number of entries currently stored under [`NAMESPACE_PREFIX`].
    async fn size(&self) -> Result<usize, WebchatError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_prefixes_bare_keys() {
        assert_eq!(namespaced("session"), "weni:webchat:session");
    }

    #[test]
    fn namespaced_is_idempotent() {
        let once = namespaced("session");
        assert_eq!(namespaced(&once), once);
    }
}
