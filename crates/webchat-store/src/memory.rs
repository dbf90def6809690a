// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An in-process, bounded-capacity backend.
//!
//! This is the default backend (`StorageKind::Session` in the
//! configuration) and the backend every test in the workspace that needs a
//! [`PersistentStore`] reaches for: no filesystem, no migrations, cleared
//! the moment the process exits.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};
use webchat_core::WebchatError;

use crate::envelope::{encode_ref, Envelope};
use crate::{namespaced, PersistentStore, NAMESPACE_PREFIX};

/// The default capacity, in entries, of a fresh [`InMemoryStore`]. Chosen to
/// comfortably hold one session record, its conversation log, and a handful
/// of cache entries without ever evicting in ordinary use; it exists purely
/// so a pathological embedder (or a test asserting eviction behavior) has a
/// bound to hit.
pub const DEFAULT_CAPACITY: usize = 256;

/// An in-memory, namespace-scoped key/value store with quota eviction.
#[derive(Debug)]
pub struct InMemoryStore {
    capacity: usize,
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Evicts the oldest 25% of entries under [`NAMESPACE_PREFIX`], ordered
    /// by envelope timestamp. Returns the number of entries evicted.
    fn evict_oldest_quarter(entries: &mut HashMap<String, String>) -> usize {
        let mut dated: Vec<(String, i64)> = entries
            .iter()
            .filter(|(k, _)| k.starts_with(NAMESPACE_PREFIX))
            .filter_map(|(k, v)| Envelope::<()>::peek_timestamp(v).map(|ts| (k.clone(), ts)))
            .collect();
        dated.sort_by_key(|(_, ts)| *ts);

        let evict_count = (dated.len() / 4).max(1).min(dated.len());
        for (key, _) in dated.into_iter().take(evict_count) {
            entries.remove(&key);
        }
        evict_count
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistentStore for InMemoryStore {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, WebchatError> {
        let key = namespaced(key);
        let entries = self.entries.lock().expect("in-memory store mutex poisoned");
        match entries.get(&key) {
            Some(raw) => match Envelope::<T>::from_json(raw) {
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

        let mut entries = self.entries.lock().expect("in-memory store mutex poisoned");
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let evicted = Self::evict_oldest_quarter(&mut entries);
            debug!(evicted, capacity = self.capacity, "in-memory store quota reached, evicted oldest entries");
        }
        entries.insert(key, raw);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), WebchatError> {
        let key = namespaced(key);
        self.entries.lock().expect("in-memory store mutex poisoned").remove(&key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), WebchatError> {
        self.entries
            .lock()
            .expect("in-memory store mutex poisoned")
            .retain(|k, _| !k.starts_with(NAMESPACE_PREFIX));
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, WebchatError> {
        let key = namespaced(key);
        Ok(self.entries.lock().expect("in-memory store mutex poisoned").contains_key(&key))
    }

    async fn keys(&self) -> Result<Vec<String>, WebchatError> {
        Ok(self
            .entries
            .lock()
            .expect("in-memory store mutex poisoned")
            .keys()
            .filter(|k| k.starts_with(NAMESPACE_PREFIX))
            .map(|k| k.trim_start_matches(NAMESPACE_PREFIX).to_string())
            .collect())
    }

    async fn size(&self) -> Result<usize, WebchatError> {
        Ok(self
            .entries
            .lock()
            .expect("in-memory store mutex poisoned")
            .keys()
            .filter(|k| k.starts_with(NAMESPACE_PREFIX))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = InMemoryStore::new();
        store.set("greeting", &"hello".to_string(), 1).await.unwrap();
        let value: Option<String> = store.get("greeting").await.unwrap();
        assert_eq!(value, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn get_missing_key_returns_none() {
        let store = InMemoryStore::new();
        let value: Option<String> = store.get("nope").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn remove_deletes_the_entry() {
        let store = InMemoryStore::new();
        store.set("k", &1u32, 1).await.unwrap();
        store.remove("k").await.unwrap();
        assert!(!store.has("k").await.unwrap());
    }

    #[tokio::test]
    async fn keys_and_size_reflect_current_contents() {
        let store = InMemoryStore::new();
        store.set("a", &1u32, 1).await.unwrap();
        store.set("b", &2u32, 2).await.unwrap();
        assert_eq!(store.size().await.unwrap(), 2);
        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn clear_removes_every_namespaced_entry() {
        let store = InMemoryStore::new();
        store.set("a", &1u32, 1).await.unwrap();
        store.set("b", &2u32, 2).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn quota_exhaustion_evicts_the_oldest_quarter() {
        let store = InMemoryStore::with_capacity(4);
        for i in 0..4 {
            store.set(&format!("k{i}"), &i, i as i64).await.unwrap();
        }
        assert_eq!(store.size().await.unwrap(), 4);

        // Writing a 5th entry should evict the single oldest (25% of 4).
        store.set("k4", &4u32, 4).await.unwrap();
        assert_eq!(store.size().await.unwrap(), 4);
        assert!(!store.has("k0").await.unwrap(), "oldest entry should have been evicted");
        assert!(store.has("k4").await.unwrap());
    }

    #[tokio::test]
    async fn overwriting_an_existing_key_does_not_trigger_eviction() {
        let store = InMemoryStore::with_capacity(2);
        store.set("a", &1u32, 1).await.unwrap();
        store.set("b", &2u32, 2).await.unwrap();
        store.set("a", &99u32, 3).await.unwrap();
        assert_eq!(store.size().await.unwrap(), 2);
        let value: Option<u32> = store.get("a").await.unwrap();
        assert_eq!(value, Some(99));
    }

    #[tokio::test]
    async fn a_value_that_fails_to_parse_reads_back_as_none_rather_than_an_error() {
        let store = InMemoryStore::new();
        store
            .entries
            .lock()
            .unwrap()
            .insert(namespaced("corrupt"), "not valid json at all".to_string());

        let value: Option<String> = store.get("corrupt").await.unwrap();
        assert_eq!(value, None);
    }
}
