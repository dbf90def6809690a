// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `register` handshake frame sent immediately after a transport opens.

use serde_json::{json, Value};

use webchat_core::StorageKind;

/// Everything the `register` frame needs, derived once from
/// [`webchat_core::WebchatConfig`] at engine construction time.
///
/// `channel_uuid` never appears in the frame itself; it only feeds the
/// `callback` URL, matching the wire shape the server expects.
#[derive(Debug, Clone)]
pub struct RegistrationData {
    pub channel_uuid: String,
    /// `<host>/c/wwc/<channel_uuid>/receive`, when `host` was configured.
    pub callback: Option<String>,
    /// Sent on the wire as `from`.
    pub session_id: Option<String>,
    /// Sent on the wire as `token`.
    pub session_token: Option<String>,
    pub session_type: StorageKind,
}

impl RegistrationData {
    /// Reuses [`StorageKind`] for the wire `session_type` field rather than
    /// inventing a parallel enum: the two concepts (which store backs the
    /// session, and what kind of session this connection is registering)
    /// are the same distinction the specification draws.
    pub fn new(
        channel_uuid: impl Into<String>,
        host: Option<&str>,
        session_id: Option<String>,
        session_token: Option<String>,
        session_type: StorageKind,
    ) -> Self {
        let channel_uuid = channel_uuid.into();
        let callback = host.map(|h| format!("{h}/c/wwc/{channel_uuid}/receive"));
        Self {
            channel_uuid,
            callback,
            session_id,
            session_token,
            session_type,
        }
    }

    pub fn to_frame(&self) -> Value {
        json!({
            "type": "register",
            "from": self.session_id,
            "callback": self.callback,
            "session_type": self.session_type,
            "token": self.session_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_url_is_built_from_host_and_channel() {
        let data = RegistrationData::new(
            "chan-1",
            Some("https://example.com"),
            None,
            None,
            StorageKind::Local,
        );
        assert_eq!(
            data.callback.as_deref(),
            Some("https://example.com/c/wwc/chan-1/receive")
        );
    }

    #[test]
    fn callback_is_none_without_a_configured_host() {
        let data = RegistrationData::new("chan-1", None, None, None, StorageKind::Local);
        assert!(data.callback.is_none());
    }

    #[test]
    fn frame_carries_session_identity_when_present() {
        let data = RegistrationData::new(
            "chan-1",
            None,
            Some("1@host".to_string()),
            Some("tok".to_string()),
            StorageKind::Session,
        );
        let frame = data.to_frame();
        assert_eq!(frame["type"], "register");
        assert_eq!(frame["from"], "1@host");
        assert_eq!(frame["token"], "tok");
        assert_eq!(frame["session_type"], "session");
    }
}
