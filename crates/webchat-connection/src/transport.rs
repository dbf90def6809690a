// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The seam between the Connection Engine's state machine and an actual
//! socket. [`Transport`] is implemented by [`crate::ws_transport::WsTransport`]
//! for production and by `webchat-test-support`'s fake for deterministic
//! tests, the same split `webchat-store`'s `PersistentStore` draws between
//! its SQLite and in-memory backends.

use async_trait::async_trait;
use tokio::sync::mpsc;

use webchat_core::WebchatError;

/// One event the transport observed on the wire.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A complete text frame was received.
    Text(String),
    /// The remote end closed the connection (or the socket errored out from
    /// under the receiving task).
    Closed,
}

/// A live connection: a sink for outbound text frames and a source of
/// inbound [`TransportEvent`]s.
pub struct TransportHandle {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Establishes connections to a single kind of remote endpoint.
///
/// A `Transport` is stateless across calls: each [`Transport::connect`]
/// call returns an independent [`TransportHandle`], so the Connection
/// Engine can reconnect simply by calling it again rather than needing the
/// transport itself to support any notion of "reset".
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<TransportHandle, WebchatError>;
}
