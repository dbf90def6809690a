// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared data model: [`Message`], [`Session`], and [`ConnectionState`].
//!
//! These are the closed sum types described by the data model: normalization
//! into these shapes happens once, at the boundary where a raw inbound frame
//! is classified, and every other component downstream consumes the typed
//! value rather than raw JSON.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The kind of a [`Message`]'s payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Audio,
    File,
    Location,
    Interactive,
    Order,
    SetCustomField,
}

/// Which party originated a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Delivery status of a message.
///
/// Transitions are monotonic along the lattice `pending -> sent ->
/// delivered` for outgoing messages or `streaming -> delivered` for
/// incoming ones; `error` is terminal from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Streaming,
    Error,
}

impl MessageStatus {
    /// Returns `true` if transitioning from `self` to `next` respects the
    /// monotonic status lattice.
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        use MessageStatus::*;
        if self == next {
            return true;
        }
        match (self, next) {
            (_, Error) => true,
            (Pending, Sent) | (Pending, Delivered) => true,
            (Sent, Delivered) => true,
            (Streaming, Delivered) => true,
            _ => false,
        }
    }
}

/// A reference to media attached to a message (image, video, audio, file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Structured extensions carried by richer message types (interactive
/// replies, carts, custom fields). Kept as an open JSON bag per field
/// because the upstream server protocol adds variants over time; each
/// named slot is still typed so callers don't have to dig through raw JSON
/// for the common cases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageExtensions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_replies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_items: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cta: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// A single message in a conversation, either sent by the user or received
/// from the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub direction: Direction,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<MessageExtensions>,
}

impl Message {
    /// Builds a minimal incoming text message with status `delivered`.
    pub fn incoming_text(id: impl Into<String>, text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            kind: MessageType::Text,
            text: Some(text.into()),
            media: None,
            timestamp,
            direction: Direction::Incoming,
            status: MessageStatus::Delivered,
            extensions: None,
        }
    }

    /// Builds the deferred initial record for a streamed incoming message:
    /// empty text, status `streaming`.
    pub fn streaming_placeholder(id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            kind: MessageType::Text,
            text: Some(String::new()),
            media: None,
            timestamp,
            direction: Direction::Incoming,
            status: MessageStatus::Streaming,
            extensions: None,
        }
    }

    /// Attempts to move this message to `next`, respecting the monotonic
    /// status lattice. Returns `false` (no-op) if the transition is invalid.
    pub fn try_set_status(&mut self, next: MessageStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}

/// Validates that `id` matches the session-identity shape `^\d+@.+$`.
pub fn is_valid_session_id(id: &str) -> bool {
    match id.split_once('@') {
        Some((prefix, suffix)) => {
            !prefix.is_empty()
                && !suffix.is_empty()
                && prefix.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// A conversation session bound to a stable identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Milliseconds since the Unix epoch.
    pub last_activity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_sent_at: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub conversation: Vec<Message>,
}

impl Session {
    /// Builds a fresh session with an empty conversation log.
    pub fn new(id: impl Into<String>, now: i64) -> Self {
        Self {
            id: id.into(),
            created_at: now,
            last_activity: now,
            last_message_sent_at: None,
            metadata: HashMap::new(),
            conversation: Vec::new(),
        }
    }

    /// `true` if [`Self::id`] matches the required session-identity shape.
    pub fn has_valid_id(&self) -> bool {
        is_valid_session_id(&self.id)
    }
}

/// Connection Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_validation() {
        assert!(is_valid_session_id("1234@example.com"));
        assert!(is_valid_session_id("1@x"));
        assert!(!is_valid_session_id("abc@example.com"));
        assert!(!is_valid_session_id("1234example.com"));
        assert!(!is_valid_session_id("1234@"));
        assert!(!is_valid_session_id("@example.com"));
        assert!(!is_valid_session_id(""));
    }

    #[test]
    fn status_lattice_outgoing() {
        assert!(MessageStatus::Pending.can_transition_to(MessageStatus::Sent));
        assert!(MessageStatus::Sent.can_transition_to(MessageStatus::Delivered));
        assert!(!MessageStatus::Delivered.can_transition_to(MessageStatus::Pending));
        assert!(!MessageStatus::Sent.can_transition_to(MessageStatus::Pending));
    }

    #[test]
    fn status_lattice_incoming_streaming() {
        assert!(MessageStatus::Streaming.can_transition_to(MessageStatus::Delivered));
        assert!(!MessageStatus::Delivered.can_transition_to(MessageStatus::Streaming));
    }

    #[test]
    fn error_is_terminal_but_reachable_from_anywhere() {
        for status in [
            MessageStatus::Pending,
            MessageStatus::Sent,
            MessageStatus::Delivered,
            MessageStatus::Streaming,
        ] {
            assert!(status.can_transition_to(MessageStatus::Error));
            assert!(!MessageStatus::Error.can_transition_to(status));
        }
    }

    #[test]
    fn try_set_status_rejects_invalid_transition() {
        let mut msg = Message::incoming_text("m1", "hi", 0);
        msg.status = MessageStatus::Delivered;
        assert!(!msg.try_set_status(MessageStatus::Streaming));
        assert_eq!(msg.status, MessageStatus::Delivered);
    }

    #[test]
    fn session_new_has_valid_id_when_caller_passes_one() {
        let session = Session::new("42@host", 100);
        assert!(session.has_valid_id());
        assert_eq!(session.created_at, 100);
        assert_eq!(session.last_activity, 100);
        assert!(session.conversation.is_empty());
    }
}
