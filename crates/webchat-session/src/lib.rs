// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Session Engine: session identity, persistence, and the conversation
//! log attached to it.
//!
//! A session is the unit of continuity across reconnects: its `id` survives
//! a dropped socket, its `conversation` is the durable record the State
//! Aggregator replays on startup, and its `last_message_sent_at` arms a
//! single-shot contact timeout so a user who goes quiet after their first
//! outgoing message (not before) eventually gets a
//! `contact:timeout:maximum_time_reached` event.
//!
//! A second, independent timer -- the cache-expiration timer -- is rearmed
//! on every read that returns a live session and on every mutation; if it
//! ever fires, the session is auto-[`cleared`](SessionEngine::clear), the
//! same outcome an explicit `clear()` call produces. This is what lets an
//! embedder leave a tab open indefinitely without accumulating an
//! ever-growing conversation log for a user who walked away.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use webchat_bus::{EventBus, WebchatEvent};
use webchat_core::{is_valid_session_id, now_ms, Message, Session, Timer, WebchatError};
use webchat_store::PersistentStore;

/// The storage key the Session Engine persists its session record under.
/// Namespacing (`weni:webchat:` prefix) is applied by the store itself.
pub const SESSION_STORAGE_KEY: &str = "session";

struct EngineState<S: PersistentStore> {
    store: Arc<S>,
    bus: EventBus,
    contact_timeout: Duration,
    auto_clear_cache: bool,
    cache_timeout: Duration,
    contact_timer: Timer,
    idle_timer: Timer,
    state: Mutex<Option<Session>>,
}

/// Owns the active [`Session`], persisting every mutation and emitting the
/// corresponding bus events.
///
/// A cloneable handle over a shared [`EngineState`] -- the same
/// `Arc<Inner>` shape `webchat_connection::ConnectionEngine` uses -- so the
/// cache-expiration timer closure can hold its own clone without the
/// Aggregator wrapping the whole engine in an `Arc` itself.
pub struct SessionEngine<S: PersistentStore> {
    inner: Arc<EngineState<S>>,
}

impl<S: PersistentStore> Clone for SessionEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: PersistentStore + 'static> SessionEngine<S> {
    /// Builds an engine with cache auto-clear enabled, matching the
    /// specification's default (`autoClearCache` defaults to `true`).
    pub fn new(store: Arc<S>, bus: EventBus, contact_timeout: Duration) -> Self {
        Self::with_cache_timeout(store, bus, contact_timeout, true, Duration::from_secs(30 * 60))
    }

    /// Builds an engine with explicit control over the cache-expiration
    /// timer, matching `WebchatConfig::auto_clear_cache` /
    /// `WebchatConfig::cache_timeout`.
    pub fn with_cache_timeout(
        store: Arc<S>,
        bus: EventBus,
        contact_timeout: Duration,
        auto_clear_cache: bool,
        cache_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(EngineState {
                store,
                bus,
                contact_timeout,
                auto_clear_cache,
                cache_timeout,
                contact_timer: Timer::new(),
                idle_timer: Timer::new(),
                state: Mutex::new(None),
            }),
        }
    }

    /// Rearms the cache-expiration timer. A no-op if `auto_clear_cache` is
    /// disabled. Called on every read that returns a live session and on
    /// every mutation, per the specification's `lastActivity` refresh rule.
    fn touch_activity(&self) {
        if !self.inner.auto_clear_cache {
            return;
        }
        let engine = self.clone();
        self.inner.idle_timer.arm(self.inner.cache_timeout, async move {
            debug!("session cache timeout elapsed, auto-clearing");
            let _ = engine.clear().await;
        });
    }

    /// Attempts to restore a previously persisted session. Returns `Ok(None)`
    /// if none is stored -- this is the normal first-launch case, not an
    /// error.
    ///
    /// If the restored session has a prior `last_message_sent_at`, the
    /// contact timeout is rescheduled from it -- firing immediately if the
    /// deadline has already elapsed while the process was away.
    pub async fn restore(&self) -> Result<Option<Session>, WebchatError> {
        let restored = self.inner.store.get::<Session>(SESSION_STORAGE_KEY).await?;
        if let Some(session) = &restored {
            *self.inner.state.lock().await = Some(session.clone());
            self.inner.bus.emit(WebchatEvent::SessionRestored(session.clone()));
            debug!(session_id = %session.id, "session restored from persistent store");
            self.touch_activity();
            if let Some(last_sent) = session.last_message_sent_at {
                self.arm_contact_timer(last_sent);
            }
        }
        Ok(restored)
    }

    /// Returns the active session, restoring it from the store if needed,
    /// or creating a fresh one if no session has ever been persisted.
    ///
    /// `requested_id`, if supplied, is adopted verbatim for a freshly
    /// created session (it is ignored if a session is being restored, since
    /// the restored identity always wins).
    pub async fn get_or_create(
        &self,
        requested_id: Option<&str>,
        id_suffix: &str,
    ) -> Result<Session, WebchatError> {
        if let Some(existing) = self.restore().await? {
            return Ok(existing);
        }
        self.create_new_session(requested_id, id_suffix).await
    }

    /// Unconditionally creates and persists a new session, replacing
    /// whatever was active before. `requested_id`, if present, must already
    /// match the session-identity shape `^\d+@.+$`; otherwise an id is
    /// generated from the current timestamp and `id_suffix`.
    pub async fn create_new_session(
        &self,
        requested_id: Option<&str>,
        id_suffix: &str,
    ) -> Result<Session, WebchatError> {
        let id = match requested_id {
            Some(id) if is_valid_session_id(id) => id.to_string(),
            Some(invalid) => {
                return Err(WebchatError::Validation(format!(
                    "session_id {invalid:?} does not match the required shape ^\\d+@.+$"
                )));
            }
            None => generate_session_id(id_suffix),
        };

        self.inner.contact_timer.cancel();
        let session = Session::new(id, now_ms());
        self.persist(&session).await?;
        *self.inner.state.lock().await = Some(session.clone());
        debug!(session_id = %session.id, "created new session");
        self.touch_activity();
        Ok(session)
    }

    /// Adopts `id` as the active session's identity, creating a session if
    /// none is active yet.
    pub async fn set_session_id(&self, id: String) -> Result<(), WebchatError> {
        if !is_valid_session_id(&id) {
            return Err(WebchatError::Validation(format!(
                "session_id {id:?} does not match the required shape ^\\d+@.+$"
            )));
        }

        let snapshot = {
            let mut guard = self.inner.state.lock().await;
            let session = guard.get_or_insert_with(|| Session::new(id.clone(), now_ms()));
            session.id = id;
            session.last_activity = now_ms();
            session.clone()
        };
        self.touch_activity();
        self.persist(&snapshot).await
    }

    /// Records the time of the most recent outgoing message and (re)arms the
    /// contact timeout to fire at `timestamp + contact_timeout`. Each call
    /// replaces any previously armed timer -- the specification's "rescheduling
    /// replaces any previously armed timer" -- so a user who keeps sending
    /// messages keeps pushing the timeout forward rather than firing on a
    /// schedule anchored to their very first message.
    pub async fn set_last_message_sent_at(&self, timestamp: i64) -> Result<(), WebchatError> {
        let snapshot = {
            let mut guard = self.inner.state.lock().await;
            let session = guard
                .as_mut()
                .ok_or_else(|| WebchatError::State("no active session".into()))?;
            session.last_message_sent_at = Some(timestamp);
            session.last_activity = timestamp;
            session.clone()
        };
        self.touch_activity();
        self.persist(&snapshot).await?;
        self.arm_contact_timer(timestamp);
        Ok(())
    }

    /// (Re)arms the contact timeout to fire at `sent_at + contact_timeout`,
    /// or immediately if that deadline has already elapsed -- the case a
    /// restored session with a stale `last_message_sent_at` hits on startup.
    /// Replaces any previously armed timer.
    fn arm_contact_timer(&self, sent_at: i64) {
        let deadline = sent_at + self.inner.contact_timeout.as_millis() as i64;
        let delay = u64::try_from(deadline - now_ms()).unwrap_or(0);
        let bus = self.inner.bus.clone();
        self.inner
            .contact_timer
            .arm(Duration::from_millis(delay), async move {
                bus.emit(WebchatEvent::ContactTimeoutMaximumTimeReached);
            });
        debug!(timeout = ?self.inner.contact_timeout, delay_ms = delay, "contact timeout (re)armed");
    }

    /// Appends `message` to the active session's conversation log.
    pub async fn append_to_conversation(&self, message: Message) -> Result<(), WebchatError> {
        let snapshot = {
            let mut guard = self.inner.state.lock().await;
            let session = guard
                .as_mut()
                .ok_or_else(|| WebchatError::State("no active session".into()))?;
            session.conversation.push(message);
            session.last_activity = now_ms();
            session.clone()
        };
        self.touch_activity();
        self.persist(&snapshot).await
    }

    /// Replaces the entire conversation log wholesale (used when restoring
    /// history from an external source).
    pub async fn set_conversation(&self, messages: Vec<Message>) -> Result<(), WebchatError> {
        let snapshot = {
            let mut guard = self.inner.state.lock().await;
            let session = guard
                .as_mut()
                .ok_or_else(|| WebchatError::State("no active session".into()))?;
            session.conversation = messages;
            session.last_activity = now_ms();
            session.clone()
        };
        self.touch_activity();
        self.persist(&snapshot).await
    }

    /// Applies an in-place mutation to the conversation log (e.g. updating
    /// or removing a single message by id) and persists the result.
    pub async fn update_conversation<F>(&self, mutate: F) -> Result<(), WebchatError>
    where
        F: FnOnce(&mut Vec<Message>),
    {
        let snapshot = {
            let mut guard = self.inner.state.lock().await;
            let session = guard
                .as_mut()
                .ok_or_else(|| WebchatError::State("no active session".into()))?;
            mutate(&mut session.conversation);
            session.last_activity = now_ms();
            session.clone()
        };
        self.touch_activity();
        self.persist(&snapshot).await
    }

    /// Returns a snapshot of the current conversation log, empty if there
    /// is no active session.
    pub async fn get_conversation(&self) -> Vec<Message> {
        self.inner.state
            .lock()
            .await
            .as_ref()
            .map(|s| s.conversation.clone())
            .unwrap_or_default()
    }

    /// The currently active session, if any. Refreshes `last_activity` and
    /// rearms the cache-expiration timer, since this is a "read returning a
    /// live session" in the specification's own words.
    pub async fn current(&self) -> Option<Session> {
        let mut guard = self.inner.state.lock().await;
        if let Some(session) = guard.as_mut() {
            session.last_activity = now_ms();
            let snapshot = session.clone();
            drop(guard);
            self.touch_activity();
            return Some(snapshot);
        }
        None
    }

    /// Clears the active session: cancels the contact and cache-expiration
    /// timeouts, removes the persisted record, and drops the in-memory
    /// state.
    pub async fn clear(&self) -> Result<(), WebchatError> {
        self.inner.contact_timer.cancel();
        self.inner.idle_timer.cancel();
        self.inner.store.remove(SESSION_STORAGE_KEY).await?;
        *self.inner.state.lock().await = None;
        self.inner.bus.emit(WebchatEvent::SessionCleared);
        Ok(())
    }

    async fn persist(&self, session: &Session) -> Result<(), WebchatError> {
        self.inner.store
            .set(SESSION_STORAGE_KEY, session, now_ms())
            .await
            .inspect_err(|err| warn!(%err, "failed to persist session"))
    }
}

/// Builds a fresh session id matching `^\d+@.+$`: the current timestamp as
/// the numeric prefix (always all-digit, always non-empty) and `suffix`
/// after the `@`. Falls back to a random suffix if `suffix` is empty, since
/// an empty suffix would otherwise produce an invalid id.
fn generate_session_id(suffix: &str) -> String {
    let suffix = if suffix.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        suffix.to_string()
    };
    format!("{}@{}", now_ms(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use webchat_store::InMemoryStore;

    fn engine() -> SessionEngine<InMemoryStore> {
        SessionEngine::new(
            Arc::new(InMemoryStore::new()),
            EventBus::new(),
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn restore_with_nothing_stored_returns_none() {
        let engine = engine();
        assert!(engine.restore().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_or_create_creates_then_restores_the_same_session() {
        let engine = engine();
        let created = engine.get_or_create(None, "host").await.unwrap();
        assert!(is_valid_session_id(&created.id));

        let engine2 = SessionEngine::new(
            Arc::new({
                // Re-use the same backing store to simulate a restart.
                let store = InMemoryStore::new();
                store
            }),
            EventBus::new(),
            Duration::from_secs(3600),
        );
        // A fresh store has nothing to restore -- this asserts the shape
        // of get_or_create, not cross-instance persistence (covered by the
        // explicit restore test below using a shared Arc).
        let _ = engine2.get_or_create(None, "host").await.unwrap();
    }

    #[tokio::test]
    async fn get_or_create_restores_from_a_shared_store() {
        let store = Arc::new(InMemoryStore::new());
        let bus = EventBus::new();
        let engine = SessionEngine::new(store.clone(), bus.clone(), Duration::from_secs(3600));
        let created = engine.get_or_create(None, "host").await.unwrap();

        let engine2 = SessionEngine::new(store, bus, Duration::from_secs(3600));
        let restored = engine2.get_or_create(None, "host").await.unwrap();
        assert_eq!(created.id, restored.id);
    }

    #[tokio::test]
    async fn create_new_session_rejects_malformed_requested_id() {
        let engine = engine();
        let result = engine.create_new_session(Some("not-valid"), "host").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn create_new_session_adopts_a_valid_requested_id() {
        let engine = engine();
        let session = engine
            .create_new_session(Some("42@host"), "host")
            .await
            .unwrap();
        assert_eq!(session.id, "42@host");
    }

    #[tokio::test]
    async fn set_session_id_rejects_malformed_ids() {
        let engine = engine();
        engine.get_or_create(None, "host").await.unwrap();
        assert!(engine.set_session_id("bad".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn append_and_get_conversation_round_trip() {
        let engine = engine();
        engine.get_or_create(None, "host").await.unwrap();
        engine
            .append_to_conversation(Message::incoming_text("m1", "hi", 0))
            .await
            .unwrap();
        let conversation = engine.get_conversation().await;
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation[0].id, "m1");
    }

    #[tokio::test]
    async fn append_without_an_active_session_errors() {
        let engine = engine();
        let result = engine
            .append_to_conversation(Message::incoming_text("m1", "hi", 0))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn clear_removes_the_session_and_cancels_the_timer() {
        let engine = engine();
        engine.get_or_create(None, "host").await.unwrap();
        engine.set_last_message_sent_at(0).await.unwrap();
        assert!(engine.inner.contact_timer.is_armed());
        engine.clear().await.unwrap();
        assert!(!engine.inner.contact_timer.is_armed());
        assert!(engine.current().await.is_none());
        assert!(engine.restore().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn contact_timeout_fires_after_the_last_send() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        let engine = SessionEngine::new(
            Arc::new(InMemoryStore::new()),
            bus,
            Duration::from_millis(100),
        );
        engine.get_or_create(None, "host").await.unwrap();
        engine.set_last_message_sent_at(now_ms()).await.unwrap();

        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;

        // A second send before the first timeout would have fired replaces
        // the armed timer -- it must not fire at the original deadline.
        engine.set_last_message_sent_at(now_ms()).await.unwrap();

        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        assert!(
            sub.try_recv().is_err(),
            "timeout must not fire at the original deadline once rescheduled"
        );

        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;

        let event = sub.recv().await.unwrap();
        assert_eq!(event.name(), "contact:timeout:maximum_time_reached");
    }

    #[tokio::test(start_paused = true)]
    async fn restore_fires_the_contact_timeout_immediately_if_already_elapsed() {
        let store = Arc::new(InMemoryStore::new());
        let bus = EventBus::new();
        let setup = SessionEngine::new(store.clone(), bus.clone(), Duration::from_millis(100));
        setup.get_or_create(None, "host").await.unwrap();
        setup.set_last_message_sent_at(now_ms()).await.unwrap();

        // Let the deadline pass before a fresh engine (simulating a process
        // restart) restores the persisted session.
        tokio::time::advance(Duration::from_millis(150)).await;
        tokio::task::yield_now().await;

        let restored_engine =
            SessionEngine::new(store, EventBus::new(), Duration::from_millis(100));
        let mut sub = restored_engine.inner.bus.subscribe();
        let restored = restored_engine.restore().await.unwrap();
        assert!(restored.is_some());

        tokio::task::yield_now().await;
        let event = sub.recv().await.unwrap();
        assert_eq!(event.name(), "contact:timeout:maximum_time_reached");
    }

    #[tokio::test(start_paused = true)]
    async fn restore_reschedules_the_contact_timeout_if_not_yet_elapsed() {
        let store = Arc::new(InMemoryStore::new());
        let setup = SessionEngine::new(store.clone(), EventBus::new(), Duration::from_millis(100));
        setup.get_or_create(None, "host").await.unwrap();
        setup.set_last_message_sent_at(now_ms()).await.unwrap();

        tokio::time::advance(Duration::from_millis(40)).await;
        tokio::task::yield_now().await;

        let bus = EventBus::new();
        let restored_engine = SessionEngine::new(store, bus, Duration::from_millis(100));
        let mut sub = restored_engine.inner.bus.subscribe();
        restored_engine.restore().await.unwrap();
        assert!(restored_engine.inner.contact_timer.is_armed());

        tokio::time::advance(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;
        assert!(
            sub.try_recv().is_err(),
            "timeout must not have fired yet -- only 90ms of the 100ms window elapsed"
        );

        tokio::time::advance(Duration::from_millis(20)).await;
        tokio::task::yield_now().await;
        assert_eq!(sub.recv().await.unwrap().name(), "contact:timeout:maximum_time_reached");
    }

    #[tokio::test(start_paused = true)]
    async fn session_auto_clears_after_the_cache_timeout_of_inactivity() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        let engine = SessionEngine::with_cache_timeout(
            Arc::new(InMemoryStore::new()),
            bus,
            Duration::from_secs(3600),
            true,
            Duration::from_millis(100),
        );
        engine.get_or_create(None, "host").await.unwrap();

        tokio::time::advance(Duration::from_millis(120)).await;
        tokio::task::yield_now().await;

        assert_eq!(sub.recv().await.unwrap().name(), "session:cleared");
        assert!(engine.current().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn a_read_before_the_cache_timeout_postpones_the_auto_clear() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        let engine = SessionEngine::with_cache_timeout(
            Arc::new(InMemoryStore::new()),
            bus,
            Duration::from_secs(3600),
            true,
            Duration::from_millis(100),
        );
        engine.get_or_create(None, "host").await.unwrap();

        tokio::time::advance(Duration::from_millis(70)).await;
        tokio::task::yield_now().await;
        // A read this close to the deadline rearms the timer; the session
        // must still be alive at what would have been the original deadline.
        assert!(engine.current().await.is_some());

        tokio::time::advance(Duration::from_millis(70)).await;
        tokio::task::yield_now().await;
        assert!(
            sub.try_recv().is_err(),
            "auto-clear must not fire at the original deadline once postponed"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_auto_clear_cache_never_clears_on_inactivity() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        let engine = SessionEngine::with_cache_timeout(
            Arc::new(InMemoryStore::new()),
            bus,
            Duration::from_secs(3600),
            false,
            Duration::from_millis(50),
        );
        engine.get_or_create(None, "host").await.unwrap();

        tokio::time::advance(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;

        assert!(sub.try_recv().is_err());
        assert!(engine.current().await.is_some());
    }
}
