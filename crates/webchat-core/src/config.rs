// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed configuration model for the webchat client core.
//!
//! `WebchatConfig` enumerates every option from the external interface
//! section of the specification. It is a plain `serde` model with
//! `deny_unknown_fields` so a host application gets an actionable error for
//! typos, the same convention the workspace uses for its own configuration
//! structs. [`WebchatConfig::validate`] enforces the invariants that must
//! surface as a returned `Err`, not merely a logged warning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WebchatError;

/// When the Connection Engine should open the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectOn {
    /// Connect as soon as the core is constructed.
    Mount,
    /// Never connect automatically; the embedder calls `connect()` itself.
    Manual,
    /// Connect lazily, on the first outbound send.
    Demand,
}

impl Default for ConnectOn {
    fn default() -> Self {
        ConnectOn::Mount
    }
}

/// Which [`webchat_store`](../webchat_store/index.html)-style backend
/// backs the Session Engine's persisted session entry.
///
/// `Local` survives process restarts (SQLite-backed); `SessionOnly` is
/// cleared whenever the embedding process exits (in-memory backed), mirroring
/// the distinction a browser draws between `localStorage` and
/// `sessionStorage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    Local,
    Session,
}

impl Default for StorageKind {
    fn default() -> Self {
        StorageKind::Local
    }
}

/// Full configuration for the webchat client core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebchatConfig {
    /// WebSocket URL of the remote conversational service. Required.
    pub socket_url: String,

    /// Identifies the channel on the remote service. Required.
    pub channel_uuid: String,

    /// Callback base used when building the `register` frame's `callback`
    /// field: `<host>/c/wwc/<channel_uuid>/receive`.
    #[serde(default)]
    pub host: Option<String>,

    /// Overrides the host-suffix used when generating a fresh session id.
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub session_token: Option<String>,

    /// A caller-supplied session id to adopt instead of generating one.
    #[serde(default)]
    pub session_id: Option<String>,

    #[serde(default)]
    pub connect_on: ConnectOn,

    #[serde(default)]
    pub storage: StorageKind,

    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "default_reconnect_interval", with = "duration_millis")]
    pub reconnect_interval: Duration,

    #[serde(default = "default_ping_interval", with = "duration_millis")]
    pub ping_interval: Duration,

    #[serde(default = "default_message_delay", with = "duration_millis")]
    pub message_delay: Duration,

    #[serde(default = "default_typing_delay", with = "duration_millis")]
    pub typing_delay: Duration,

    #[serde(default = "default_typing_timeout", with = "duration_millis")]
    pub typing_timeout: Duration,

    #[serde(default = "default_true")]
    pub enable_typing_indicator: bool,

    #[serde(default = "default_true")]
    pub auto_clear_cache: bool,

    #[serde(default = "default_cache_timeout", with = "duration_millis")]
    pub cache_timeout: Duration,

    /// Expressed as a [`Duration`] at the API boundary so the historical
    /// ambiguity between a milliseconds-variant and a minutes-variant of
    /// this field (see the specification's Open Questions) cannot recur.
    #[serde(default = "default_contact_timeout", with = "duration_millis")]
    pub contact_timeout: Duration,

    /// When set, sending an outbound message schedules a deferred
    /// `typing:start` after `typing_delay` (suppressed if an indicator is
    /// already active). Not part of the enumerated external option list in
    /// the specification's own words, but described by name in the
    /// Streaming Message Processor's indicator section; defaults to `false`
    /// so a host that never heard of the feature sees no behavior change.
    #[serde(default)]
    pub start_typing_on_message_sent: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_reconnect_attempts() -> u32 {
    30
}

fn default_reconnect_interval() -> Duration {
    Duration::from_millis(3_000)
}

fn default_ping_interval() -> Duration {
    Duration::from_millis(50_000)
}

fn default_message_delay() -> Duration {
    Duration::from_millis(1_000)
}

fn default_typing_delay() -> Duration {
    Duration::from_millis(2_000)
}

fn default_typing_timeout() -> Duration {
    Duration::from_millis(50_000)
}

fn default_cache_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_contact_timeout() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

impl WebchatConfig {
    /// Builds a minimal, otherwise-default configuration.
    pub fn new(socket_url: impl Into<String>, channel_uuid: impl Into<String>) -> Self {
        Self {
            socket_url: socket_url.into(),
            channel_uuid: channel_uuid.into(),
            host: None,
            client_id: None,
            session_token: None,
            session_id: None,
            connect_on: ConnectOn::default(),
            storage: StorageKind::default(),
            auto_reconnect: default_true(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_interval: default_reconnect_interval(),
            ping_interval: default_ping_interval(),
            message_delay: default_message_delay(),
            typing_delay: default_typing_delay(),
            typing_timeout: default_typing_timeout(),
            enable_typing_indicator: default_true(),
            auto_clear_cache: default_true(),
            cache_timeout: default_cache_timeout(),
            contact_timeout: default_contact_timeout(),
            start_typing_on_message_sent: false,
        }
    }

    /// Validates invariants that must be rejected outright rather than
    /// merely logged: required fields, a session id that, if supplied,
    /// must already match the session-identity shape, and non-zero timing
    /// knobs.
    pub fn validate(&self) -> Result<(), WebchatError> {
        if self.socket_url.trim().is_empty() {
            return Err(WebchatError::Validation("socket_url is required".into()));
        }
        if self.channel_uuid.trim().is_empty() {
            return Err(WebchatError::Validation("channel_uuid is required".into()));
        }
        if let Some(id) = &self.session_id {
            if !crate::types::is_valid_session_id(id) {
                return Err(WebchatError::Validation(format!(
                    "session_id {id:?} does not match the required shape ^\\d+@.+$"
                )));
            }
        }
        if self.max_reconnect_attempts == 0 {
            return Err(WebchatError::Validation(
                "max_reconnect_attempts must be at least 1".into(),
            ));
        }
        if self.reconnect_interval.is_zero() {
            return Err(WebchatError::Validation(
                "reconnect_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// `serde(with = "duration_millis")`: (de)serializes a [`Duration`] as a
/// plain integer count of milliseconds, matching the wire/config shape the
/// specification enumerates (e.g. `reconnectInterval` default `3000`).
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
