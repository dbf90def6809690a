// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Streaming Message Processor.
//!
//! Consumes raw inbound frames forwarded by the Connection Engine,
//! classifies them ([`frame`]), assembles sequence-numbered deltas into
//! complete messages ([`stream_state`]), suppresses duplicate finalized
//! text ([`dedup`]), and arbitrates the typing/thinking indicators
//! ([`processor`]). [`StreamProcessor`] is the crate's single public entry
//! point; everything else is plumbing it owns.

mod dedup;
mod frame;
mod processor;
mod stream_state;

pub use frame::{classify, validate_seq, ClassifiedFrame};
pub use processor::{StreamProcessor, StreamProcessorConfig};
