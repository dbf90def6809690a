// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Connection Engine.
//!
//! Owns the transport lifecycle: opening a connection, the `register`
//! handshake, ping keep-alive, and reconnect-with-backoff. Everything that
//! is not one of the three control frames it understands itself
//! (`ready_for_message`, `pong`, `error`) is forwarded, as raw JSON,
//! through the channel returned by [`ConnectionEngine::new`] for the
//! Aggregator and Streaming Message Processor to consume.

mod engine;
mod frame;
mod registration;
mod transport;
mod ws_transport;

pub use engine::{ConnectionEngine, ConnectionEngineConfig};
pub use frame::{classify_control, ControlFrame};
pub use registration::RegistrationData;
pub use transport::{Transport, TransportEvent, TransportHandle};
pub use ws_transport::WsTransport;
