// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic test doubles for the webchat client core workspace.
//!
//! [`FakeTransport`] plays the same role for `webchat-connection`'s tests
//! that `MockChannel` plays in the workspace's own adapter tests: an
//! injectable-inbound, captured-outbound double standing in for a real
//! socket, built on the same `Arc<Mutex<VecDeque<_>>>` plus `Notify` shape.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use webchat_connection::{Transport, TransportEvent, TransportHandle};
use webchat_core::WebchatError;

/// A [`Transport`] double whose connect outcome, and whose inbound traffic
/// once connected, are entirely driven by the test.
#[derive(Clone)]
pub struct FakeTransport {
    state: Arc<State>,
}

struct State {
    /// `connect()` fails this many times (in order) before succeeding.
    remaining_failures: AtomicUsize,
    /// Every outbound frame sent by the engine under test, in send order.
    sent: Mutex<Vec<String>>,
    /// The live connection's inbound sender, set each time `connect()`
    /// succeeds; `push_inbound` delivers through this.
    current_inbound: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    /// Frames injected before a connection exists yet, delivered as soon as
    /// one opens.
    pending_inbound: Mutex<VecDeque<TransportEvent>>,
    connected_notify: Notify,
}

impl FakeTransport {
    /// A transport whose `connect()` always succeeds immediately.
    pub fn new() -> Self {
        Self::failing_n_times(0)
    }

    /// A transport whose first `n` `connect()` calls fail with a transport
    /// error before the next one succeeds.
    pub fn failing_n_times(n: usize) -> Self {
        Self {
            state: Arc::new(State {
                remaining_failures: AtomicUsize::new(n),
                sent: Mutex::new(Vec::new()),
                current_inbound: Mutex::new(None),
                pending_inbound: Mutex::new(VecDeque::new()),
                connected_notify: Notify::new(),
            }),
        }
    }

    /// Every frame the engine under test has sent, in order, as raw text.
    pub fn sent_frames(&self) -> Vec<String> {
        self.state.sent.lock().expect("mutex poisoned").clone()
    }

    /// Delivers `event` on the currently open connection, or queues it to
    /// be delivered as soon as the next connection opens.
    pub fn push_inbound(&self, event: TransportEvent) {
        let guard = self.state.current_inbound.lock().expect("mutex poisoned");
        match guard.as_ref() {
            Some(tx) => {
                let _ = tx.send(event);
            }
            None => {
                drop(guard);
                self.state
                    .pending_inbound
                    .lock()
                    .expect("mutex poisoned")
                    .push_back(event);
            }
        }
    }

    /// Convenience: delivers a text frame.
    pub fn push_text(&self, text: impl Into<String>) {
        self.push_inbound(TransportEvent::Text(text.into()));
    }

    /// Waits until at least one successful connection has been established.
    pub async fn wait_for_connect(&self) {
        self.connected_notify.notified().await;
    }
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, _url: &str) -> Result<TransportHandle, WebchatError> {
        if self.state.remaining_failures.load(Ordering::SeqCst) > 0 {
            self.state.remaining_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(WebchatError::transport("fake transport: simulated failure"));
        }

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let sent = Arc::clone(&self.state);
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                sent.sent.lock().expect("mutex poisoned").push(text);
            }
        });

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<TransportEvent>();
        {
            let mut pending = self.state.pending_inbound.lock().expect("mutex poisoned");
            for event in pending.drain(..) {
                let _ = inbound_tx.send(event);
            }
        }
        *self.state.current_inbound.lock().expect("mutex poisoned") = Some(inbound_tx);
        self.state.connected_notify.notify_waiters();

        Ok(TransportHandle {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
