// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded window of recently finalized incoming text bodies.
//!
//! Used to drop server echoes of identical text arriving via parallel
//! delivery paths: a finalized streamed reply's text is recorded here too
//! (see the specification's Open Questions), so a later exact-duplicate
//! `message` frame for the same text is suppressed regardless of which path
//! produced the original.

use std::collections::VecDeque;

/// The window holds at most this many finalized texts (`N=5` per the
/// specification's data model).
pub const CAPACITY: usize = 5;

/// A fixed-capacity, insertion-ordered set of recently finalized texts.
#[derive(Debug, Default, Clone)]
pub struct DedupWindow {
    entries: VecDeque<String>,
}

impl DedupWindow {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(CAPACITY),
        }
    }

    /// `true` if `text` exactly matches an entry currently in the window.
    pub fn contains(&self, text: &str) -> bool {
        self.entries.iter().any(|e| e == text)
    }

    /// Records `text` as finalized, evicting the oldest entry if the window
    /// is already at [`CAPACITY`]. Empty text is still recorded -- an empty
    /// streamed reply is a legitimate (if unusual) finalized body.
    pub fn push(&mut self, text: impl Into<String>) {
        if self.entries.len() >= CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(text.into());
    }
}
