// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy shared across the webchat client core.

use thiserror::Error;

/// The primary error type surfaced by the webchat client core.
///
/// Recoverable conditions (parse failures, missing stream ids, storage
/// read failures) are reported on the event bus as `error` events and do
/// not necessarily produce an `Err` from the call that triggered them;
/// invariant-breaking conditions (bad configuration, a duplicate history
/// request) are always also returned as `Err` to the caller.
#[derive(Debug, Error)]
pub enum WebchatError {
    /// Socket-level failure: closed before send, open failed, or the
    /// transport reported an I/O error.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The wire protocol was violated: a `stream_start`/`stream_end` frame
    /// without an id, or a delta with an invalid sequence number.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Bad configuration or a malformed outbound payload.
    #[error("validation error: {0}")]
    Validation(String),

    /// Persistent store failure (get/set/quota).
    #[error("storage error: {0}")]
    Storage(String),

    /// An operation was invoked in a state that forbids it (e.g. a second
    /// concurrent history request, or a recording already in progress).
    #[error("state error: {0}")]
    State(String),
}

impl WebchatError {
    /// Builds a [`WebchatError::Transport`] with no wrapped source.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a [`WebchatError::Transport`] wrapping a lower-level source error.
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// `true` for errors the spec classifies as recoverable: callers may
    /// swallow these locally once they have been emitted on the event bus.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WebchatError::Transport { .. } | WebchatError::Protocol(_) | WebchatError::Storage(_)
        )
    }
}
