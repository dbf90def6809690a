// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A typed publish/subscribe event bus.
//!
//! Every externally-observable occurrence the core produces -- connection
//! lifecycle transitions, message mutations, indicator flips, session
//! changes, errors -- is a [`WebchatEvent`] variant. Components publish by
//! calling [`EventBus::emit`]; embedders (and other components) subscribe by
//! calling [`EventBus::subscribe`], which hands back an owned
//! [`tokio::sync::broadcast::Receiver`]. A subscriber that falls behind sees
//! `RecvError::Lagged` rather than blocking a publisher, the same trade-off
//! the workspace's channel multiplexer makes with its bounded mpsc.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use webchat_core::{AggregatorSnapshot, ConnectionState, Message, Session};

/// The default capacity of the broadcast channel backing an [`EventBus`].
///
/// Sized generously above the expected burst of a single streamed message
/// (one `delta` event per token plus a handful of lifecycle events); a
/// subscriber would need to fall behind by this many events before lagging.
pub const DEFAULT_CAPACITY: usize = 1024;

/// A single published occurrence.
///
/// Variant names mirror the external event names from the wire/embedding
/// contract (`connected`, `message:added`, `typing:start`, ...); the
/// `snake_case` rename keeps the JSON projection (used by
/// [`WebchatEvent::name`] and by any embedder that serializes the event for
/// logging or a devtools panel) aligned with that contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WebchatEvent {
    Initialized,
    Destroyed,
    Connected,
    Disconnected {
        reason: Option<String>,
    },
    Reconnecting {
        attempt: u32,
        delay_ms: u64,
    },
    ConnectionStatusChanged {
        previous: ConnectionState,
        current: ConnectionState,
    },
    ContactTimeoutMaximumTimeReached,
    MessageReceived(Message),
    MessageSent(Message),
    MessageAdded(Message),
    MessageUpdated(Message),
    MessageRemoved {
        id: String,
    },
    MessageProcessed(Message),
    MessageUnknown {
        raw: serde_json::Value,
    },
    MessagesCleared,
    TypingStart,
    TypingStop,
    ThinkingStart,
    ThinkingStop,
    SessionRestored(Session),
    SessionCleared,
    StateChanged {
        previous: Arc<AggregatorSnapshot>,
        current: Arc<AggregatorSnapshot>,
    },
    StateReset,
    ContextChanged {
        context: Option<serde_json::Value>,
    },
    HistoryLoaded {
        count: usize,
    },
    Error {
        message: String,
        recoverable: bool,
    },
}

impl WebchatEvent {
    /// The wire/embedding event name, e.g. `"message:added"`.
    pub fn name(&self) -> &'static str {
        match self {
            WebchatEvent::Initialized => "initialized",
            WebchatEvent::Destroyed => "destroyed",
            WebchatEvent::Connected => "connected",
            WebchatEvent::Disconnected { .. } => "disconnected",
            WebchatEvent::Reconnecting { .. } => "reconnecting",
            WebchatEvent::ConnectionStatusChanged { .. } => "connection:status:changed",
            WebchatEvent::ContactTimeoutMaximumTimeReached => {
                "contact:timeout:maximum_time_reached"
            }
            WebchatEvent::MessageReceived(_) => "message:received",
            WebchatEvent::MessageSent(_) => "message:sent",
            WebchatEvent::MessageAdded(_) => "message:added",
            WebchatEvent::MessageUpdated(_) => "message:updated",
            WebchatEvent::MessageRemoved { .. } => "message:removed",
            WebchatEvent::MessageProcessed(_) => "message:processed",
            WebchatEvent::MessageUnknown { .. } => "message:unknown",
            WebchatEvent::MessagesCleared => "messages:cleared",
            WebchatEvent::TypingStart => "typing:start",
            WebchatEvent::TypingStop => "typing:stop",
            WebchatEvent::ThinkingStart => "thinking:start",
            WebchatEvent::ThinkingStop => "thinking:stop",
            WebchatEvent::SessionRestored(_) => "session:restored",
            WebchatEvent::SessionCleared => "session:cleared",
            WebchatEvent::StateChanged { .. } => "state:changed",
            WebchatEvent::StateReset => "state:reset",
            WebchatEvent::ContextChanged { .. } => "context:changed",
            WebchatEvent::HistoryLoaded { .. } => "history:loaded",
            WebchatEvent::Error { .. } => "error",
        }
    }
}

/// A handle to a subscription. Dropping it unsubscribes.
pub type Subscription = broadcast::Receiver<WebchatEvent>;

/// A cloneable handle to the shared event bus.
///
/// Cloning an `EventBus` is cheap (it shares the underlying
/// `broadcast::Sender`); every component that needs to publish or subscribe
/// holds its own clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WebchatEvent>,
}

impl EventBus {
    /// Builds a bus with [`DEFAULT_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Builds a bus with an explicit backlog capacity, mainly useful for
    /// tests that want to exercise lag behavior with a tiny buffer.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to every current subscriber.
    ///
    /// Returns the number of subscribers the event was delivered to. It is
    /// not an error for this to be zero -- a bus with no subscribers yet
    /// (or no longer) simply drops the event, the same "fire and forget"
    /// semantics `tokio::sync::broadcast` gives by default.
    pub fn emit(&self, event: WebchatEvent) -> usize {
        let name = event.name();
        match self.sender.send(event) {
            Ok(count) => {
                trace!(event = name, subscribers = count, "event emitted");
                count
            }
            Err(_) => {
                trace!(event = name, "event emitted with no subscribers");
                0
            }
        }
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> Subscription {
        self.sender.subscribe()
    }

    /// The number of currently live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
