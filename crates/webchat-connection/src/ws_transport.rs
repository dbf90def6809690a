// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Production [`Transport`] backed by `tokio-tungstenite`.
//!
//! Structured the same way the workspace's own `SignalingClient` connects:
//! `connect_async`, split the stream into a sink and a source, then hand
//! each half to its own spawned task communicating over unbounded mpsc
//! channels rather than sharing the stream across tasks directly.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

use webchat_core::WebchatError;

use crate::transport::{Transport, TransportEvent, TransportHandle};

/// A [`Transport`] that opens a real WebSocket connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> Result<TransportHandle, WebchatError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| WebchatError::transport_with_source("failed to open websocket", e))?;

        let (mut write, mut read) = stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = write.send(WsMessage::Text(text.into())).await {
                    warn!(error = %e, "websocket send failed, closing sender task");
                    break;
                }
            }
            let _ = write.close().await;
            debug!("websocket sender task terminated");
        });

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<TransportEvent>();
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(WsMessage::Text(text)) => {
                        if inbound_tx.send(TransportEvent::Text(text.to_string())).is_err() {
                            break;
                        }
                    }
                    Ok(WsMessage::Close(_)) => {
                        let _ = inbound_tx.send(TransportEvent::Closed);
                        break;
                    }
                    Ok(_) => {
                        // Binary/ping/pong frames carry no protocol meaning here.
                    }
                    Err(e) => {
                        warn!(error = %e, "websocket read error, treating as closed");
                        let _ = inbound_tx.send(TransportEvent::Closed);
                        break;
                    }
                }
            }
            debug!("websocket receiver task terminated");
        });

        Ok(TransportHandle {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
