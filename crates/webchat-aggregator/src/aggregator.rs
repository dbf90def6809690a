// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`StateAggregator`]: construction, the snapshot mutation primitive, the
//! public operations the specification enumerates, and the two background
//! tasks that keep the snapshot in sync with the rest of the core.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use webchat_bus::{EventBus, Subscription, WebchatEvent};
use webchat_connection::{ConnectionEngine, ConnectionEngineConfig, RegistrationData, Transport};
use webchat_core::{
    now_ms, AggregatorSnapshot, ConnectionState, Direction, Message, MessageStatus, MessageType,
    Session, WebchatConfig, WebchatError,
};
use webchat_session::SessionEngine;
use webchat_store::PersistentStore;
use webchat_stream::{StreamProcessor, StreamProcessorConfig};

/// How long a `get_history` call waits for the matching `history` frame
/// before giving up and clearing the in-progress flag.
const HISTORY_TIMEOUT: Duration = Duration::from_secs(30);

struct Inner<T: Transport, S: PersistentStore> {
    bus: EventBus,
    snapshot: Mutex<Arc<AggregatorSnapshot>>,
    connection: ConnectionEngine<T>,
    session: SessionEngine<S>,
    processor: StreamProcessor,
    history_pending: Mutex<Option<oneshot::Sender<Vec<Value>>>>,
}

/// The State Aggregator: a cloneable handle over the whole webchat client
/// core. Constructing one builds and wires together every other component
/// (Session Engine, Connection Engine, Streaming Message Processor); an
/// embedder talks to the core exclusively through this type.
pub struct StateAggregator<T: Transport, S: PersistentStore> {
    inner: Arc<Inner<T, S>>,
}

impl<T: Transport, S: PersistentStore> Clone for StateAggregator<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, S> StateAggregator<T, S>
where
    T: Transport + 'static,
    S: PersistentStore + 'static,
{
    /// Builds every component, restores (or creates) the active session,
    /// and spawns the two background tasks that keep the snapshot in sync.
    /// Does not open the transport -- the caller decides when to do that
    /// per `config.connect_on`, since scheduling that decision is host glue
    /// outside this crate's scope.
    pub async fn new(config: WebchatConfig, transport: T, store: Arc<S>) -> Result<Self, WebchatError> {
        config.validate()?;

        let bus = EventBus::new();
        let session = SessionEngine::with_cache_timeout(
            store,
            bus.clone(),
            config.contact_timeout,
            config.auto_clear_cache,
            config.cache_timeout,
        );
        let id_suffix = config.client_id.as_deref().unwrap_or("webchat");
        let session_record = session
            .get_or_create(config.session_id.as_deref(), id_suffix)
            .await?;

        let registration = RegistrationData::new(
            config.channel_uuid.clone(),
            config.host.as_deref(),
            Some(session_record.id.clone()),
            config.session_token.clone(),
            config.storage,
        );
        let connection_config = ConnectionEngineConfig {
            socket_url: config.socket_url.clone(),
            auto_reconnect: config.auto_reconnect,
            max_reconnect_attempts: config.max_reconnect_attempts,
            reconnect_interval: config.reconnect_interval,
            ping_interval: config.ping_interval,
        };
        let (connection, frame_rx) =
            ConnectionEngine::new(transport, connection_config, registration, bus.clone());

        let processor = StreamProcessor::new(
            bus.clone(),
            StreamProcessorConfig {
                message_delay: config.message_delay,
                typing_delay: config.typing_delay,
                typing_timeout: config.typing_timeout,
                enable_typing_indicator: config.enable_typing_indicator,
                start_typing_on_message_sent: config.start_typing_on_message_sent,
            },
        );

        let snapshot = AggregatorSnapshot {
            messages: Arc::new(session_record.conversation.clone()),
            session: Some(session_record),
            ..AggregatorSnapshot::default()
        };

        let aggregator = Self {
            inner: Arc::new(Inner {
                bus: bus.clone(),
                snapshot: Mutex::new(Arc::new(snapshot)),
                connection,
                session,
                processor,
                history_pending: Mutex::new(None),
            }),
        };

        aggregator.spawn_frame_forwarder(frame_rx);
        aggregator.spawn_event_mirror(bus.subscribe());
        aggregator.inner.bus.emit(WebchatEvent::Initialized);
        Ok(aggregator)
    }

    // ---- snapshot access -------------------------------------------------

    /// The current, immutable view of everything the Aggregator owns.
    pub fn snapshot(&self) -> Arc<AggregatorSnapshot> {
        self.inner.snapshot.lock().expect("snapshot mutex poisoned").clone()
    }

    /// Subscribes to every event the core publishes.
    pub fn subscribe(&self) -> Subscription {
        self.inner.bus.subscribe()
    }

    fn mutate(&self, f: impl FnOnce(&mut AggregatorSnapshot)) -> Arc<AggregatorSnapshot> {
        let mut guard = self.inner.snapshot.lock().expect("snapshot mutex poisoned");
        let previous = guard.clone();
        let mut next = (*previous).clone();
        f(&mut next);
        let next = Arc::new(next);
        *guard = next.clone();
        drop(guard);
        self.inner.bus.emit(WebchatEvent::StateChanged {
            previous,
            current: next.clone(),
        });
        next
    }

    // ---- public mutation operations --------------------------------------

    /// Appends `message` to the view and emits `message:added`.
    pub fn add_message(&self, message: Message) {
        let event_message = message.clone();
        self.mutate(|snapshot| {
            let mut messages = (*snapshot.messages).clone();
            messages.push(message);
            snapshot.messages = Arc::new(messages);
        });
        self.inner.bus.emit(WebchatEvent::MessageAdded(event_message));
    }

    /// Applies `patch` to the message with id `id`. A no-op, with no event,
    /// if no message with that id is in the log.
    pub fn update_message(&self, id: &str, patch: impl FnOnce(&mut Message)) {
        let exists = self
            .inner
            .snapshot
            .lock()
            .expect("snapshot mutex poisoned")
            .messages
            .iter()
            .any(|m| m.id == id);
        if !exists {
            return;
        }

        let next = self.mutate(|snapshot| {
            let mut messages = (*snapshot.messages).clone();
            if let Some(message) = messages.iter_mut().find(|m| m.id == id) {
                patch(message);
            }
            snapshot.messages = Arc::new(messages);
        });

        if let Some(updated) = next.messages.iter().find(|m| m.id == id) {
            self.inner.bus.emit(WebchatEvent::MessageUpdated(updated.clone()));
        }
    }

    /// Removes the message with id `id` from the log, if present.
    pub fn remove_message(&self, id: &str) {
        let exists = self
            .inner
            .snapshot
            .lock()
            .expect("snapshot mutex poisoned")
            .messages
            .iter()
            .any(|m| m.id == id);
        if !exists {
            return;
        }
        self.mutate(|snapshot| {
            let messages: Vec<Message> = snapshot.messages.iter().filter(|m| m.id != id).cloned().collect();
            snapshot.messages = Arc::new(messages);
        });
        self.inner.bus.emit(WebchatEvent::MessageRemoved { id: id.to_string() });
    }

    /// Empties the message log. The active session is left untouched.
    pub fn clear_messages(&self) {
        self.mutate(|snapshot| snapshot.messages = Arc::new(Vec::new()));
        self.inner.bus.emit(WebchatEvent::MessagesCleared);
    }

    /// Mirrors a connection lifecycle transition into the snapshot.
    pub fn set_connection_status(&self, state: ConnectionState) {
        self.mutate(|snapshot| snapshot.connection_state = state);
    }

    /// Mirrors a session identity change into the snapshot.
    pub fn set_session(&self, session: Option<Session>) {
        self.mutate(|snapshot| snapshot.session = session);
    }

    /// Replaces the conversational context attached to outbound frames.
    pub fn set_context(&self, context: Option<Value>) {
        self.mutate(|snapshot| snapshot.context = context.clone());
        self.inner.bus.emit(WebchatEvent::ContextChanged { context });
    }

    /// Raises or lowers the typing indicator and emits the matching
    /// `typing:start`/`typing:stop` event. Called directly this is a
    /// deliberate embedder override; indicator frames arriving from the
    /// server go through [`Self::mirror_typing`] instead, which does not
    /// re-emit an event the Streaming Message Processor already raised.
    pub fn set_typing(&self, active: bool) {
        self.mirror_typing(active);
        self.inner
            .bus
            .emit(if active { WebchatEvent::TypingStart } else { WebchatEvent::TypingStop });
    }

    /// See [`Self::set_typing`]; the thinking-indicator counterpart.
    pub fn set_thinking(&self, active: bool) {
        self.mirror_thinking(active);
        self.inner
            .bus
            .emit(if active { WebchatEvent::ThinkingStart } else { WebchatEvent::ThinkingStop });
    }

    fn mirror_typing(&self, active: bool) {
        self.mutate(|snapshot| snapshot.is_typing = active);
    }

    fn mirror_thinking(&self, active: bool) {
        self.mutate(|snapshot| snapshot.is_thinking = active);
    }

    /// Records the most recent error message, or clears it with `None`.
    pub fn set_error(&self, message: Option<String>) {
        self.mutate(|snapshot| snapshot.last_error = message);
    }

    /// Drops everything -- messages, session, context, indicators, error --
    /// back to its default value and emits `state:reset`.
    pub fn reset(&self) {
        self.mutate(|snapshot| *snapshot = AggregatorSnapshot::default());
        self.inner.bus.emit(WebchatEvent::StateReset);
    }

    // ---- session-backed operations ---------------------------------------

    /// Adopts `id` as the active session's identity and clears the message
    /// log, since a different session has a different conversation.
    pub async fn set_session_id(&self, id: String) -> Result<(), WebchatError> {
        self.inner.session.set_session_id(id).await?;
        self.clear_messages();
        let session = self.inner.session.current().await;
        self.set_session(session);
        Ok(())
    }

    /// Clears the active session entirely: persisted record, in-memory
    /// state, and the message log.
    pub async fn clear_session(&self) -> Result<(), WebchatError> {
        self.inner.session.clear().await?;
        self.clear_messages();
        self.set_session(None);
        Ok(())
    }

    // ---- outbound operations ----------------------------------------------

    /// Sends a plain text message: appends a `pending` entry to the log,
    /// persists it, hands it to the Connection Engine, then advances the
    /// entry to `sent` or `error` depending on the outcome.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<Message, WebchatError> {
        let text = text.into();
        let session = self.inner.session.get_or_create(None, "webchat").await?;

        let id = format!("out_{}", Uuid::new_v4());
        let message = Message {
            id: id.clone(),
            kind: MessageType::Text,
            text: Some(text.clone()),
            media: None,
            timestamp: now_ms(),
            direction: Direction::Outgoing,
            status: MessageStatus::Pending,
            extensions: None,
        };

        self.add_message(message.clone());
        self.inner.session.append_to_conversation(message.clone()).await?;

        let context = self.snapshot().context.clone();
        let frame = json!({
            "type": "message",
            "message": {"type": "text", "text": text},
            "from": session.id,
            "context": context,
        });

        self.dispatch_outbound(id, message, frame).await
    }

    /// Sends a `set_custom_field` control frame.
    pub fn set_custom_field(&self, key: impl Into<String>, value: Value) -> Result<(), WebchatError> {
        let frame = json!({"type": "set_custom_field", "data": {"key": key.into(), "value": value}});
        self.inner.connection.send_text(frame.to_string())
    }

    /// Requests conversation history from the remote service. Only one
    /// request may be in flight at a time; a second concurrent call is
    /// rejected outright. Times out after 30 seconds.
    pub async fn get_history(&self, params: Value) -> Result<Vec<Value>, WebchatError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.history_pending.lock().expect("mutex poisoned");
            if pending.is_some() {
                return Err(WebchatError::State("history request already in progress".into()));
            }
            *pending = Some(tx);
        }

        let frame = json!({"type": "get_history", "params": params});
        if let Err(err) = self.inner.connection.send_text(frame.to_string()) {
            self.inner.history_pending.lock().expect("mutex poisoned").take();
            return Err(err);
        }

        match tokio::time::timeout(HISTORY_TIMEOUT, rx).await {
            Ok(Ok(history)) => {
                self.inner.bus.emit(WebchatEvent::HistoryLoaded { count: history.len() });
                Ok(history)
            }
            Ok(Err(_)) => Err(WebchatError::transport("history request channel dropped")),
            Err(_) => {
                self.inner.history_pending.lock().expect("mutex poisoned").take();
                Err(WebchatError::transport("history request timed out"))
            }
        }
    }

    async fn dispatch_outbound(
        &self,
        id: String,
        message: Message,
        frame: Value,
    ) -> Result<Message, WebchatError> {
        match self.inner.connection.send_text(frame.to_string()) {
            Ok(()) => {
                self.update_message(&id, |m| {
                    m.try_set_status(MessageStatus::Sent);
                });
                self.inner.session.set_last_message_sent_at(now_ms()).await?;
                self.inner.processor.notify_message_sent();
                let sent = self
                    .snapshot()
                    .messages
                    .iter()
                    .find(|m| m.id == id)
                    .cloned()
                    .unwrap_or(message);
                self.inner.bus.emit(WebchatEvent::MessageSent(sent.clone()));
                Ok(sent)
            }
            Err(err) => {
                self.update_message(&id, |m| {
                    m.try_set_status(MessageStatus::Error);
                });
                self.inner.bus.emit(WebchatEvent::Error {
                    message: err.to_string(),
                    recoverable: err.is_recoverable(),
                });
                Err(err)
            }
        }
    }

    // ---- connection lifecycle ---------------------------------------------

    pub async fn connect(&self) -> Result<(), WebchatError> {
        self.inner.connection.connect().await
    }

    pub fn disconnect(&self) {
        self.inner.connection.disconnect(false);
    }

    /// Tears down the connection permanently and emits `destroyed`. The
    /// background tasks wind down on their own once the bus and the
    /// Connection Engine's frame channel are dropped along with this handle.
    pub fn shutdown(&self) {
        self.inner.connection.disconnect(true);
        self.inner.bus.emit(WebchatEvent::Destroyed);
    }

    // ---- background wiring -------------------------------------------------

    /// Forwards every raw inbound frame from the Connection Engine either to
    /// the pending `get_history` call (for `history` frames, which the
    /// Streaming Message Processor does not classify) or to the processor.
    fn spawn_frame_forwarder(&self, mut frame_rx: tokio::sync::mpsc::UnboundedReceiver<Value>) {
        let aggregator = self.clone();
        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                if frame.get("type").and_then(Value::as_str) == Some("history") {
                    aggregator.resolve_history(frame);
                } else {
                    aggregator.inner.processor.process(&frame);
                }
            }
        });
    }

    fn resolve_history(&self, frame: Value) {
        let entries = frame
            .get("history")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        match self.inner.history_pending.lock().expect("mutex poisoned").take() {
            Some(tx) => {
                let _ = tx.send(entries);
            }
            None => debug!("history frame arrived with no pending request"),
        }
    }

    /// Mirrors bus events the rest of the core already emits into the
    /// Aggregator's own snapshot, and persists processed messages into the
    /// Session Engine's conversation log.
    fn spawn_event_mirror(&self, mut subscription: Subscription) {
        let aggregator = self.clone();
        tokio::spawn(async move {
            loop {
                match subscription.recv().await {
                    Ok(event) => aggregator.mirror_event(event).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "aggregator event mirror lagged, skipping events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    async fn mirror_event(&self, event: WebchatEvent) {
        match event {
            WebchatEvent::MessageProcessed(message) => self.apply_processed_message(message).await,
            WebchatEvent::ConnectionStatusChanged { current, .. } => self.set_connection_status(current),
            WebchatEvent::TypingStart => self.mirror_typing(true),
            WebchatEvent::TypingStop => self.mirror_typing(false),
            WebchatEvent::ThinkingStart => self.mirror_thinking(true),
            WebchatEvent::ThinkingStop => self.mirror_thinking(false),
            WebchatEvent::SessionRestored(session) => self.set_session(Some(session)),
            WebchatEvent::SessionCleared => self.set_session(None),
            WebchatEvent::Error { message, .. } => self.set_error(Some(message)),
            _ => {}
        }
    }

    /// A processed message either updates an entry already in the log (the
    /// streamed-placeholder-then-delta case) or is freshly appended; either
    /// way it is persisted into the session's durable conversation record.
    async fn apply_processed_message(&self, message: Message) {
        let exists = self.snapshot().messages.iter().any(|m| m.id == message.id);
        if exists {
            let for_log = message.clone();
            self.update_message(&message.id, move |m| *m = for_log);
        } else {
            self.add_message(message.clone());
        }

        let persisted = self
            .inner
            .session
            .update_conversation(|conversation| {
                if let Some(existing) = conversation.iter_mut().find(|m| m.id == message.id) {
                    *existing = message.clone();
                } else {
                    conversation.push(message.clone());
                }
            })
            .await;

        if let Err(err) = persisted {
            warn!(%err, "failed to persist a processed message into the session conversation log");
        }
    }
}
