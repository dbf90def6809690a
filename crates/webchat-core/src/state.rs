// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The State Aggregator's externally-visible snapshot shape.
//!
//! Defined here, rather than in `webchat-aggregator` itself, so that
//! `webchat-bus` can carry a snapshot inside a `state:changed` event without
//! creating a dependency cycle between the aggregator and the bus.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{ConnectionState, Message, Session};

/// An immutable point-in-time view of everything the State Aggregator owns.
///
/// `messages` is wrapped in an `Arc` so that emitting a `state:changed` event
/// on every mutation is a pointer clone, not a deep copy of the whole
/// conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorSnapshot {
    pub messages: Arc<Vec<Message>>,
    pub session: Option<Session>,
    pub connection_state: ConnectionState,
    pub context: Option<serde_json::Value>,
    pub is_typing: bool,
    pub is_thinking: bool,
    pub last_error: Option<String>,
}

impl Default for AggregatorSnapshot {
    fn default() -> Self {
        Self {
            messages: Arc::new(Vec::new()),
            session: None,
            connection_state: ConnectionState::default(),
            context: None,
            is_typing: false,
            is_thinking: false,
            last_error: None,
        }
    }
}
