// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification of an inbound frame into the tagged [`ClassifiedFrame`]
//! variant the rest of this crate consumes. No code downstream of
//! [`classify`] touches a raw [`serde_json::Value`] again.

use serde_json::Value;

/// The result of classifying one inbound frame.
///
/// Classification order (per the specification): an explicit `type` field
/// wins; failing that, a `v` field paired with a numeric `seq` and no `type`
/// is a [`ClassifiedFrame::Delta`]; failing that, an inner `message.type`
/// is treated as a non-streamed [`ClassifiedFrame::Message`]; anything else
/// is [`ClassifiedFrame::Unknown`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedFrame {
    /// A complete, non-streamed payload. Carries the full raw frame so
    /// `id`/`message.messageId` fallback extraction has everything it needs.
    Message(Value),
    /// Opens a streamed assembly. `id` is `None` only if the frame supplied
    /// neither an `id` nor a `message.messageId` -- a protocol error.
    StreamStart { id: Option<String> },
    /// Carries one incremental chunk.
    Delta {
        seq: Value,
        v: Option<String>,
        id: Option<String>,
    },
    /// Closes a streamed assembly.
    StreamEnd { id: Option<String> },
    /// A typing/thinking indicator hint.
    TypingStart { from: Option<String> },
    /// Did not match any recognized shape.
    Unknown(Value),
}

fn str_field<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field).and_then(Value::as_str)
}

/// Extracts a stream id from `id` or, failing that, `message.messageId`.
fn extract_stream_id(value: &Value) -> Option<String> {
    str_field(value, "id")
        .or_else(|| value.get("message").and_then(|m| str_field(m, "messageId")))
        .map(str::to_string)
}

/// Classifies one raw inbound frame.
pub fn classify(value: &Value) -> ClassifiedFrame {
    if let Some(kind) = str_field(value, "type") {
        return match kind {
            "message" => {
                ClassifiedFrame::Message(value.get("message").cloned().unwrap_or(Value::Null))
            }
            "stream_start" => ClassifiedFrame::StreamStart {
                id: extract_stream_id(value),
            },
            "stream_end" => ClassifiedFrame::StreamEnd {
                id: extract_stream_id(value),
            },
            "typing_start" => ClassifiedFrame::TypingStart {
                from: str_field(value, "from").map(str::to_string),
            },
            _ => ClassifiedFrame::Unknown(value.clone()),
        };
    }

    if value.get("v").is_some() && value.get("seq").is_some() {
        return ClassifiedFrame::Delta {
            seq: value.get("seq").cloned().unwrap_or(Value::Null),
            v: str_field(value, "v").map(str::to_string),
            id: str_field(value, "id").map(str::to_string),
        };
    }

    if value
        .get("message")
        .and_then(|m| str_field(m, "type"))
        .is_some()
    {
        return ClassifiedFrame::Message(value.get("message").cloned().unwrap_or(Value::Null));
    }

    ClassifiedFrame::Unknown(value.clone())
}

/// Validates that `seq` is a strictly positive integer, returning it as a
/// `u64` on success. Rejects non-numbers, negative numbers, zero, and
/// fractional numbers (e.g. `3.5`) -- the last case relies on `serde_json`
/// only reporting `as_u64`/`as_i64` for values that were written as a whole
/// number on the wire.
pub fn validate_seq(seq: &Value) -> Option<u64> {
    let n = seq.as_u64().or_else(|| {
        seq.as_i64()
            .and_then(|signed| u64::try_from(signed).ok())
    })?;
    if n >= 1 {
        Some(n)
    } else {
        None
    }
}
