// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The State Aggregator: the single owner of the message log and indicator
//! state, and the wiring point between the Connection Engine, the Streaming
//! Message Processor, and the Session Engine.
//!
//! Inbound data flows `Connection Engine -> Aggregator -> Streaming Message
//! Processor -> Aggregator` (the Aggregator forwards raw frames to the
//! processor and mirrors what comes back into its own snapshot and the
//! Session Engine's persisted conversation log). Outbound data flows
//! `embedder -> Aggregator -> Connection Engine -> transport`. Every
//! mutation of the snapshot emits `state:changed` carrying both the previous
//! and current snapshot, mirroring the `ChannelMultiplexer`'s own
//! single-writer state-broadcast shape elsewhere in the workspace.

mod aggregator;

pub use aggregator::StateAggregator;
