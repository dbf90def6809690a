// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared foundation for the webchat client core workspace.
//!
//! This crate provides the data model ([`types`]), the error taxonomy
//! ([`error`]), the typed configuration model ([`config`]), and the
//! first-class timer primitive ([`timer`]) used by every other crate in the
//! workspace: `webchat-bus`, `webchat-retry`, `webchat-store`,
//! `webchat-session`, `webchat-connection`, `webchat-stream`, and
//! `webchat-aggregator`.

pub mod config;
pub mod error;
pub mod state;
pub mod timer;
pub mod types;

pub use config::{ConnectOn, StorageKind, WebchatConfig};
pub use error::WebchatError;
pub use state::AggregatorSnapshot;
pub use timer::Timer;
pub use types::{
    ConnectionState, Direction, MediaRef, Message, MessageExtensions, MessageStatus, MessageType,
    Session,
};

/// Returns the current time in milliseconds since the Unix epoch.
///
/// Centralized so every component stamps timestamps consistently and so a
/// test harness has one seam to mock if it ever needs to.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
