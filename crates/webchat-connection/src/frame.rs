// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification of control frames the Connection Engine consumes itself.
//!
//! Only `ready_for_message`, `pong`, and `error` are control frames; every
//! other inbound frame (messages, streamed deltas, typing hints, anything
//! unrecognized) is the Streaming Message Processor's concern and is
//! forwarded upward untouched rather than parsed here.

use serde_json::Value;

/// A frame the Connection Engine itself must react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFrame {
    /// The server has finished registering this client and is ready to
    /// receive outbound messages.
    ReadyForMessage,
    /// Reply to a keep-alive ping.
    Pong,
    /// A server-reported error, not necessarily fatal to the connection.
    Error { message: String },
}

/// Classifies `value` as a [`ControlFrame`] if it is one of the three
/// recognized control shapes, else `None`.
pub fn classify_control(value: &Value) -> Option<ControlFrame> {
    match value.get("type").and_then(Value::as_str)? {
        "ready_for_message" => Some(ControlFrame::ReadyForMessage),
        "pong" => Some(ControlFrame::Pong),
        "error" => Some(ControlFrame::Error {
            message: value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        }),
        _ => None,
    }
}
