// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `{version, timestamp, data}` wrapper every stored value is kept in.
//!
//! Wrapping every value lets a later release change `data`'s shape without
//! losing the ability to tell old records apart from new ones, and gives the
//! quota-eviction policy a `timestamp` to order by without deserializing
//! `data` itself.

use serde::{Deserialize, Serialize};
use webchat_core::WebchatError;

/// The current envelope format version written by this crate.
pub const CURRENT_VERSION: u32 = 1;

/// A versioned, timestamped wrapper around a stored value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub version: u32,
    /// Milliseconds since the Unix epoch, used to order entries for
    /// quota-eviction and cache-expiry decisions.
    pub timestamp: i64,
    pub data: T,
}

impl<T> Envelope<T> {
    /// Wraps `data` at [`CURRENT_VERSION`], stamped with `timestamp`.
    pub fn new(data: T, timestamp: i64) -> Self {
        Self {
            version: CURRENT_VERSION,
            timestamp,
            data,
        }
    }
}

impl<T: Serialize> Envelope<T> {
    pub fn to_json(&self) -> Result<String, WebchatError> {
        serde_json::to_string(self)
            .map_err(|e| WebchatError::Storage(format!("failed to encode envelope: {e}")))
    }
}

/// A borrowing twin of [`Envelope`] so a caller holding `&T` can encode a
/// value without cloning it first.
#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    timestamp: i64,
    data: &'a T,
}

/// Encodes `value` into an envelope JSON string without taking ownership.
pub fn encode_ref<T: Serialize>(value: &T, timestamp: i64) -> Result<String, WebchatError> {
    let envelope = EnvelopeRef {
        version: CURRENT_VERSION,
        timestamp,
        data: value,
    };
    serde_json::to_string(&envelope)
        .map_err(|e| WebchatError::Storage(format!("failed to encode envelope: {e}")))
}

impl<T: for<'de> Deserialize<'de>> Envelope<T> {
    /// Decodes an envelope from its stored JSON form.
    ///
    /// A future migration hook: if a stored envelope's `version` predates
    /// [`CURRENT_VERSION`], a real migration step would transform `data`
    /// before deserializing it into `T`. Today there is only one version, so
    /// this is a straight decode.
    pub fn from_json(raw: &str) -> Result<Self, WebchatError> {
        serde_json::from_str(raw)
            .map_err(|e| WebchatError::Storage(format!("failed to decode envelope: {e}")))
    }

    /// Extracts only the `timestamp` field without decoding `data`, used by
    /// the quota-eviction scan so it doesn't pay to deserialize `T` for
    /// entries it isn't keeping.
    pub fn peek_timestamp(raw: &str) -> Option<i64> {
        #[derive(Deserialize)]
        struct TimestampOnly {
            timestamp: i64,
        }
        serde_json::from_str::<TimestampOnly>(raw)
            .ok()
            .map(|t| t.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let envelope = Envelope::new("hello".to_string(), 42);
        let json = envelope.to_json().unwrap();
        let decoded: Envelope<String> = Envelope::from_json(&json).unwrap();
        assert_eq!(decoded.data, "hello");
        assert_eq!(decoded.timestamp, 42);
        assert_eq!(decoded.version, CURRENT_VERSION);
    }

    #[test]
    fn peek_timestamp_does_not_require_matching_data_shape() {
        let envelope = Envelope::new(vec![1, 2, 3], 99);
        let json = envelope.to_json().unwrap();
        assert_eq!(Envelope::<()>::peek_timestamp(&json), Some(99));
    }
}
