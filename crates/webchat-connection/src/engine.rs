// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Connection Engine: a `{disconnected, connecting, connected,
//! reconnecting, error}` state machine wrapping a [`Transport`].
//!
//! Mirrors [`crate::registration`]'s handshake and the retry-with-backoff
//! reconnect loop. Raw frames that are not one of the three control shapes
//! ([`crate::frame::ControlFrame`]) are forwarded, untouched, over a
//! dedicated internal channel -- the Streaming Message Processor's concern,
//! not this engine's -- keeping the public [`WebchatEvent`] surface limited
//! to the connection lifecycle events the specification enumerates.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use webchat_bus::{EventBus, WebchatEvent};
use webchat_core::{ConnectionState, Timer, WebchatError};
use webchat_retry::{RetryPolicy, RetryPolicyConfig};

use crate::frame::{classify_control, ControlFrame};
use crate::registration::RegistrationData;
use crate::transport::{Transport, TransportEvent};

/// Construction-time parameters the engine needs from
/// [`webchat_core::WebchatConfig`].
#[derive(Debug, Clone)]
pub struct ConnectionEngineConfig {
    pub socket_url: String,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_interval: Duration,
    pub ping_interval: Duration,
}

struct Inner<T: Transport> {
    transport: T,
    config: ConnectionEngineConfig,
    registration: RegistrationData,
    bus: EventBus,
    frame_tx: mpsc::UnboundedSender<Value>,
    state: Mutex<ConnectionState>,
    retry: Mutex<RetryPolicy>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    ping_timer: Timer,
    reconnect_timer: Timer,
    /// Set by an explicit [`ConnectionEngine::disconnect`] with
    /// `permanent = true`; suppresses any reconnect attempt that a
    /// concurrently in-flight disconnect task might otherwise schedule.
    shutting_down: Mutex<bool>,
}

/// A cloneable handle to the Connection Engine.
pub struct ConnectionEngine<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for ConnectionEngine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> ConnectionEngine<T> {
    /// Builds a disconnected engine. Returns the engine plus the receiving
    /// half of the internal channel that carries every non-control inbound
    /// frame (messages, streamed deltas, typing hints, anything
    /// unrecognized) up to the Aggregator / Streaming Message Processor.
    pub fn new(
        transport: T,
        config: ConnectionEngineConfig,
        registration: RegistrationData,
        bus: EventBus,
    ) -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let retry = RetryPolicy::new(RetryPolicyConfig {
            base_delay: config.reconnect_interval,
            ..RetryPolicyConfig::default()
        });
        let engine = Self {
            inner: Arc::new(Inner {
                transport,
                config,
                registration,
                bus,
                frame_tx,
                state: Mutex::new(ConnectionState::Disconnected),
                retry: Mutex::new(retry),
                outbound: Mutex::new(None),
                ping_timer: Timer::new(),
                reconnect_timer: Timer::new(),
                shutting_down: Mutex::new(false),
            }),
        };
        (engine, frame_rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock().expect("connection state mutex poisoned")
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = {
            let mut state = self.inner.state.lock().expect("connection state mutex poisoned");
            let previous = *state;
            *state = next;
            previous
        };
        if previous != next {
            self.inner
                .bus
                .emit(WebchatEvent::ConnectionStatusChanged { previous, current: next });
        }
    }

    /// Opens the transport, sends `register`, and waits for
    /// `ready_for_message` on a spawned receiver task. Returns once the
    /// transport itself is open; registration completing is observed
    /// asynchronously as a `connected` event, matching the specification's
    /// description of connection as a two-step handshake.
    pub async fn connect(&self) -> Result<(), WebchatError> {
        *self.inner.shutting_down.lock().expect("mutex poisoned") = false;
        self.set_state(ConnectionState::Connecting);

        let handle = match self.inner.transport.connect(&self.inner.config.socket_url).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(error = %err, "connection attempt failed");
                self.inner.bus.emit(WebchatEvent::Error {
                    message: err.to_string(),
                    recoverable: err.is_recoverable(),
                });
                self.handle_disconnect(Some(err.to_string()));
                return Err(err);
            }
        };

        *self.inner.outbound.lock().expect("mutex poisoned") = Some(handle.outbound);
        self.send_raw(self.inner.registration.to_frame());

        let engine = self.clone();
        let mut inbound = handle.inbound;
        tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                match event {
                    TransportEvent::Text(text) => engine.handle_inbound_text(&text),
                    TransportEvent::Closed => break,
                }
            }
            engine.handle_disconnect(Some("transport closed".to_string()));
        });

        Ok(())
    }

    fn handle_inbound_text(&self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "dropping frame with invalid json");
                return;
            }
        };

        match classify_control(&value) {
            Some(ControlFrame::ReadyForMessage) => self.on_registered(),
            Some(ControlFrame::Pong) => debug!("pong received"),
            Some(ControlFrame::Error { message }) => {
                if needs_reregistration(&message) {
                    debug!(%message, "server demands re-registration, resending register frame");
                    self.send_raw(self.inner.registration.to_frame());
                }
                self.inner.bus.emit(WebchatEvent::Error {
                    message,
                    recoverable: true,
                });
            }
            None => {
                if self.inner.frame_tx.send(value).is_err() {
                    warn!("no receiver for forwarded inbound frames");
                }
            }
        }
    }

    fn on_registered(&self) {
        self.set_state(ConnectionState::Connected);
        self.inner.bus.emit(WebchatEvent::Connected);
        self.inner
            .retry
            .lock()
            .expect("retry mutex poisoned")
            .reset();
        self.arm_ping();
    }

    fn arm_ping(&self) {
        let engine = self.clone();
        self.inner.ping_timer.arm(self.inner.config.ping_interval, async move {
            engine.send_ping_and_rearm();
        });
    }

    fn send_ping_and_rearm(&self) {
        if self.state() != ConnectionState::Connected {
            return;
        }
        self.send_raw(json!({"type": "ping"}));
        self.arm_ping();
    }

    fn send_raw(&self, frame: Value) {
        let text = frame.to_string();
        let guard = self.inner.outbound.lock().expect("mutex poisoned");
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(text).is_err() {
                    warn!("outbound channel closed, frame dropped");
                }
            }
            None => warn!("attempted to send with no outbound channel open"),
        }
    }

    /// Sends a pre-serialized outbound frame, failing if the connection is
    /// not currently open.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), WebchatError> {
        if self.state() != ConnectionState::Connected {
            return Err(WebchatError::State("not connected".into()));
        }
        let guard = self.inner.outbound.lock().expect("mutex poisoned");
        match guard.as_ref() {
            Some(tx) => tx
                .send(text.into())
                .map_err(|_| WebchatError::transport("outbound channel closed")),
            None => Err(WebchatError::State("not connected".into())),
        }
    }

    fn handle_disconnect(&self, reason: Option<String>) {
        self.inner.ping_timer.cancel();
        *self.inner.outbound.lock().expect("mutex poisoned") = None;

        if *self.inner.shutting_down.lock().expect("mutex poisoned") {
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        self.inner.bus.emit(WebchatEvent::Disconnected { reason });

        if self.inner.config.auto_reconnect {
            self.schedule_reconnect();
        } else {
            self.set_state(ConnectionState::Error);
        }
    }

    fn schedule_reconnect(&self) {
        let mut retry = self.inner.retry.lock().expect("retry mutex poisoned");
        if retry.attempts() >= self.inner.config.max_reconnect_attempts {
            drop(retry);
            self.set_state(ConnectionState::Error);
            return;
        }
        let delay = retry.next();
        let attempt = retry.attempts();
        drop(retry);

        self.set_state(ConnectionState::Reconnecting);
        self.inner.bus.emit(WebchatEvent::Reconnecting {
            attempt,
            delay_ms: delay.as_millis() as u64,
        });

        let engine = self.clone();
        self.inner.reconnect_timer.arm(delay, async move {
            let _ = engine.connect().await;
        });
    }

    /// Tears the connection down. `permanent = true` suppresses any
    /// further auto-reconnect attempt until [`Self::connect`] is called
    /// again explicitly.
    pub fn disconnect(&self, permanent: bool) {
        if permanent {
            *self.inner.shutting_down.lock().expect("mutex poisoned") = true;
        }
        self.inner.ping_timer.cancel();
        self.inner.reconnect_timer.cancel();
        *self.inner.outbound.lock().expect("mutex poisoned") = None;
        self.set_state(ConnectionState::Disconnected);
        self.inner.bus.emit(WebchatEvent::Disconnected {
            reason: Some("client disconnect".to_string()),
        });
    }
}

/// `true` if a server error frame's message demands the client
/// re-register, per the two substrings the specification calls out.
fn needs_reregistration(message: &str) -> bool {
    message.contains("unable to register") || message.contains("already exists")
}
