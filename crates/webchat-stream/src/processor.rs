// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Streaming Message Processor: assembles `stream_start`/`delta`/
//! `stream_end` triples into a single [`Message`], suppresses duplicate
//! non-streamed text, and arbitrates the typing/thinking indicators.
//!
//! [`StreamProcessor`] is a cloneable handle over a shared [`Inner`] --
//! the same pattern [`webchat_bus::EventBus`] uses -- so a timer closure can
//! hold its own clone without the caller wrapping the whole processor in an
//! `Arc`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use webchat_bus::{EventBus, WebchatEvent};
use webchat_core::{now_ms, Direction, Message, MessageStatus, MessageType, WebchatError};

use crate::dedup::DedupWindow;
use crate::frame::{classify, validate_seq, ClassifiedFrame};
use crate::stream_state::StreamState;

/// Configuration the processor needs from [`webchat_core::WebchatConfig`].
///
/// Kept as its own small struct (rather than taking the whole
/// `WebchatConfig`) so this crate does not need to know about fields it has
/// no use for, mirroring how `webchat-retry`'s `RetryPolicyConfig` only
/// carries the knobs its own algorithm consumes.
#[derive(Debug, Clone)]
pub struct StreamProcessorConfig {
    /// Minimum spacing enforced between consecutive fully-formed incoming
    /// messages reaching the bus.
    pub message_delay: Duration,
    /// Delay before a deferred `typing:start` fires after an outbound send,
    /// when [`Self::start_typing_on_message_sent`] is set.
    pub typing_delay: Duration,
    /// How long a typing/thinking indicator stays up before auto-clearing.
    pub typing_timeout: Duration,
    /// Master switch for the typing/thinking indicator subsystem.
    pub enable_typing_indicator: bool,
    /// Schedule a deferred `typing:start` whenever the embedder reports an
    /// outbound message was sent (suppressed if an indicator is already
    /// active).
    pub start_typing_on_message_sent: bool,
}

impl Default for StreamProcessorConfig {
    fn default() -> Self {
        Self {
            message_delay: Duration::from_millis(300),
            typing_delay: Duration::from_millis(500),
            typing_timeout: Duration::from_secs(15),
            enable_typing_indicator: true,
            start_typing_on_message_sent: false,
        }
    }
}

/// Mutable processor state, guarded by a blocking [`std::sync::Mutex`].
///
/// The processor never awaits while the lock is held, so a blocking mutex
/// is the right tool here -- the same choice `webchat-store`'s
/// `InMemoryStore` makes for its own in-process map.
#[derive(Debug, Default)]
struct ProcessorState {
    current_stream: Option<StreamState>,
    dedup: DedupWindow,
    /// Local bookkeeping only: whether this processor currently believes the
    /// typing or thinking indicator is showing. The externally-visible
    /// indicator state lives on the Aggregator's snapshot; these copies
    /// exist purely so the processor can decide whether to suppress a
    /// redundant start or rearm the auto-clear timeout. The two are
    /// independent, per the specification's data model.
    typing_active: bool,
    thinking_active: bool,
}

struct Inner {
    bus: EventBus,
    config: StreamProcessorConfig,
    state: Mutex<ProcessorState>,
    typing_timer: webchat_core::Timer,
    thinking_timer: webchat_core::Timer,
    delivery_tx: mpsc::UnboundedSender<Message>,
}

/// A cloneable handle to the streaming message processor.
#[derive(Clone)]
pub struct StreamProcessor {
    inner: Arc<Inner>,
}

impl StreamProcessor {
    /// Builds a processor publishing to `bus`, spawning the background task
    /// that paces fully-formed message emission by `config.message_delay`.
    pub fn new(bus: EventBus, config: StreamProcessorConfig) -> Self {
        let (delivery_tx, mut delivery_rx) = mpsc::unbounded_channel::<Message>();
        let pacing_bus = bus.clone();
        let message_delay = config.message_delay;
        tokio::spawn(async move {
            while let Some(message) = delivery_rx.recv().await {
                if !message_delay.is_zero() {
                    tokio::time::sleep(message_delay).await;
                }
                pacing_bus.emit(WebchatEvent::MessageProcessed(message));
            }
        });

        Self {
            inner: Arc::new(Inner {
                bus,
                config,
                state: Mutex::new(ProcessorState::default()),
                typing_timer: webchat_core::Timer::new(),
                thinking_timer: webchat_core::Timer::new(),
                delivery_tx,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ProcessorState> {
        self.inner.state.lock().expect("processor state mutex poisoned")
    }

    /// Enqueues a fully-formed message for paced emission.
    fn deliver(&self, message: Message) {
        // The receiving end only drops this once the processor itself (and
        // the spawned pacing task holding the other half) is gone, so a
        // send error here would mean the task panicked.
        if self.inner.delivery_tx.send(message).is_err() {
            warn!("stream processor delivery queue is closed, dropping message");
        }
    }

    /// Classifies and dispatches one raw inbound frame.
    pub fn process(&self, raw: &Value) {
        match classify(raw) {
            ClassifiedFrame::StreamStart { id } => self.handle_stream_start(id),
            ClassifiedFrame::Delta { seq, v, id } => self.handle_delta(seq, v, id),
            ClassifiedFrame::StreamEnd { id } => self.handle_stream_end(id),
            ClassifiedFrame::Message(value) => self.handle_message(&value),
            ClassifiedFrame::TypingStart { from } => self.handle_typing_start(from),
            ClassifiedFrame::Unknown(value) => {
                debug!(?value, "dropping unrecognized frame");
                self.inner.bus.emit(WebchatEvent::MessageUnknown { raw: value });
            }
        }
    }

    fn handle_stream_start(&self, id: Option<String>) {
        let Some(id) = id else {
            self.emit_protocol_error("stream_start frame missing an id");
            return;
        };
        let id = stream_message_id(Some(id));
        let mut state = self.state();
        if state.current_stream.is_some() {
            debug!(%id, "stream_start replaces an already-active stream");
        }
        state.current_stream = Some(StreamState::new(id, now_ms()));
    }

    /// Applies one delta, synthesizing a stream first if none is active
    /// (the server is allowed to skip `stream_start` entirely).
    ///
    /// Synthetic creation and ordinary application share one code path: a
    /// synthetic stream is seeded with `message_emitted = true` (its
    /// placeholder observation is emitted immediately, inline with
    /// creation) and then falls straight through into the same
    /// seq-matching logic a `stream_start`-opened stream uses, so this
    /// delta is applied rather than merely opening an empty stream.
    fn handle_delta(&self, seq: Value, v: Option<String>, id: Option<String>) {
        let Some(seq) = validate_seq(&seq) else {
            warn!(?seq, "dropping delta with invalid seq");
            return;
        };
        let v = v.unwrap_or_default();

        let mut state = self.state();
        let synthesized = state.current_stream.is_none();
        if synthesized {
            let stream_id = stream_message_id(id);
            let mut fresh = StreamState::new(stream_id, now_ms());
            fresh.message_emitted = true;
            state.current_stream = Some(fresh);
            let placeholder = {
                let stream = state.current_stream.as_ref().expect("just inserted");
                Message::streaming_placeholder(stream.id.clone(), stream.created_at)
            };
            drop(state);
            self.clear_indicators_for_stream_activity();
            self.inner.bus.emit(WebchatEvent::MessageProcessed(placeholder));
            state = self.state();
        }

        let Some(stream) = state.current_stream.as_mut() else {
            unreachable!("stream was just created or already present");
        };

        if !stream.message_emitted {
            stream.message_emitted = true;
            let placeholder = Message::streaming_placeholder(stream.id.clone(), stream.created_at);
            drop(state);
            self.clear_indicators_for_stream_activity();
            self.inner.bus.emit(WebchatEvent::MessageProcessed(placeholder));
            state = self.state();
        }

        let stream = match state.current_stream.as_mut() {
            Some(stream) => stream,
            None => return,
        };

        if seq < stream.next_expected_seq {
            // Old/duplicate seq: per the ascending-seq invariant this must
            // not mutate any state.
            debug!(seq, expected = stream.next_expected_seq, "dropping stale delta");
            return;
        }

        if seq > stream.next_expected_seq {
            stream.buffer(seq, v);
            return;
        }

        stream.apply_in_order(&v);
        let update = Message {
            id: stream.id.clone(),
            kind: MessageType::Text,
            text: Some(stream.text.clone()),
            media: None,
            timestamp: stream.created_at,
            direction: Direction::Incoming,
            status: MessageStatus::Streaming,
            extensions: None,
        };
        self.inner.bus.emit(WebchatEvent::MessageProcessed(update));
    }

    /// Finalizes a streamed message. An `id` that does not match the
    /// currently active stream -- including the case where no stream is
    /// active at all -- is treated as closing a stream that is no longer
    /// (or never was) live: the active stream, if any, is left untouched
    /// and an empty-text final observation is still emitted for the
    /// requested id, per the specification's stale-`stream_end` tie-break.
    fn handle_stream_end(&self, id: Option<String>) {
        let Some(raw_id) = id else {
            self.emit_protocol_error("stream_end frame missing an id");
            return;
        };
        let requested_id = stream_message_id(Some(raw_id));

        let mut state = self.state();
        match state.current_stream.take() {
            Some(stream) if stream.id == requested_id => {
                state.dedup.push(stream.text.clone());
                drop(state);
                self.clear_indicators_for_stream_activity();

                let final_message = Message {
                    id: stream.id,
                    kind: MessageType::Text,
                    text: Some(stream.text),
                    media: None,
                    timestamp: stream.created_at,
                    direction: Direction::Incoming,
                    status: MessageStatus::Delivered,
                    extensions: None,
                };
                self.deliver(final_message);
            }
            Some(mismatched) => {
                // Put the mismatched-but-live stream back; it was not the
                // target of this stream_end.
                state.current_stream = Some(mismatched);
                drop(state);
                warn!(%requested_id, "stream_end id does not match the active stream");
                self.deliver(stale_stream_end_message(requested_id));
            }
            None => {
                drop(state);
                debug!(%requested_id, "stream_end with no active stream, emitting empty-text final");
                self.deliver(stale_stream_end_message(requested_id));
            }
        }
    }

    /// Emits a `WebchatEvent::Error` carrying a [`WebchatError::Protocol`]
    /// message, for frame shapes the wire protocol forbids (a
    /// `stream_start`/`stream_end` without an id).
    fn emit_protocol_error(&self, message: impl Into<String>) {
        let error = WebchatError::Protocol(message.into());
        warn!(%error);
        self.inner.bus.emit(WebchatEvent::Error {
            message: error.to_string(),
            recoverable: error.is_recoverable(),
        });
    }

    /// Handles a complete, non-streamed inbound message frame.
    ///
    /// Duplicate suppression is dedup-first and total: an exact-duplicate
    /// text body produces no event, no dedup-window mutation, and no
    /// indicator change whatsoever.
    fn handle_message(&self, value: &Value) {
        let message = parse_incoming_message(value);
        self.inner.bus.emit(WebchatEvent::MessageReceived(message.clone()));

        let mut state = self.state();
        if let Some(text) = &message.text {
            if !text.is_empty() && state.dedup.contains(text) {
                debug!(%message.id, "suppressing duplicate message text");
                return;
            }
            state.dedup.push(text.clone());
        }
        drop(state);

        self.clear_indicators_for_stream_activity();
        self.deliver(message);
    }

    /// Dispatches a `typing_start` frame to whichever indicator it names:
    /// `from == "ai-assistant"` raises the thinking indicator, anything
    /// else (including no `from` at all) raises the typing indicator --
    /// the two are otherwise handled identically.
    fn handle_typing_start(&self, from: Option<String>) {
        if !self.inner.config.enable_typing_indicator {
            return;
        }

        let mut state = self.state();
        if let Some(stream) = &state.current_stream {
            // Once content has actually started arriving a fresh indicator
            // would be stale; before the first delta it is still allowed.
            if stream.next_expected_seq > 1 {
                return;
            }
        }

        let is_thinking = from.as_deref() == Some("ai-assistant");
        let already_active = if is_thinking {
            state.thinking_active
        } else {
            state.typing_active
        };
        if is_thinking {
            state.thinking_active = true;
        } else {
            state.typing_active = true;
        }
        drop(state);

        if !already_active {
            self.inner.bus.emit(if is_thinking {
                WebchatEvent::ThinkingStart
            } else {
                WebchatEvent::TypingStart
            });
        }

        let handle = self.clone();
        let timer = if is_thinking {
            &self.inner.thinking_timer
        } else {
            &self.inner.typing_timer
        };
        timer.arm(self.inner.config.typing_timeout, async move {
            if is_thinking {
                handle.stop_thinking();
            } else {
                handle.stop_typing();
            }
        });
    }

    fn stop_typing(&self) {
        let mut state = self.state();
        if !state.typing_active {
            return;
        }
        state.typing_active = false;
        drop(state);
        self.inner.bus.emit(WebchatEvent::TypingStop);
    }

    fn stop_thinking(&self) {
        let mut state = self.state();
        if !state.thinking_active {
            return;
        }
        state.thinking_active = false;
        drop(state);
        self.inner.bus.emit(WebchatEvent::ThinkingStop);
    }

    /// Clears any active indicator the instant real message content starts
    /// or finishes arriving, so the indicator never lingers over content.
    fn clear_indicators_for_stream_activity(&self) {
        self.inner.typing_timer.cancel();
        self.inner.thinking_timer.cancel();
        self.stop_typing();
        self.stop_thinking();
    }

    /// Called by the embedder side when an outbound message has been sent.
    /// Schedules a deferred `typing:start` after `typing_delay`, unless an
    /// indicator is already active.
    pub fn notify_message_sent(&self) {
        if !self.inner.config.start_typing_on_message_sent {
            return;
        }
        if self.state().typing_active {
            return;
        }

        let handle = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(handle.inner.config.typing_delay).await;
            handle.handle_typing_start(None);
        });
    }
}

fn stream_message_id(id: Option<String>) -> String {
    match id {
        Some(id) => format!("msg_{id}"),
        None => format!("msg_{}", Uuid::new_v4()),
    }
}

/// Builds the empty-text, already-`Delivered` observation emitted for a
/// `stream_end` whose id names a stream that is not (or no longer) active.
fn stale_stream_end_message(id: String) -> Message {
    Message {
        id,
        kind: MessageType::Text,
        text: Some(String::new()),
        media: None,
        timestamp: now_ms(),
        direction: Direction::Incoming,
        status: MessageStatus::Delivered,
        extensions: None,
    }
}

fn parse_incoming_message(value: &Value) -> Message {
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("msg_{}", Uuid::new_v4()));
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .and_then(|s| serde_json::from_value::<MessageType>(Value::String(s.to_string())).ok())
        .unwrap_or(MessageType::Text);
    let text = value.get("text").and_then(Value::as_str).map(str::to_string);

    Message {
        id,
        kind,
        text,
        media: None,
        timestamp: now_ms(),
        direction: Direction::Incoming,
        status: MessageStatus::Delivered,
        extensions: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use webchat_bus::EventBus;

    fn processor() -> (StreamProcessor, webchat_bus::Subscription) {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        let processor = StreamProcessor::new(
            bus,
            StreamProcessorConfig {
                message_delay: Duration::from_millis(0),
                ..Default::default()
            },
        );
        (processor, sub)
    }

    async fn next_processed(sub: &mut webchat_bus::Subscription) -> Message {
        loop {
            match sub.recv().await.unwrap() {
                WebchatEvent::MessageProcessed(message) => return message,
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn in_order_stream_assembles_and_finalizes() {
        let (processor, mut sub) = processor();

        processor.process(&json!({"type": "stream_start", "id": "a"}));
        processor.process(&json!({"seq": 1, "v": "Hel"}));
        processor.process(&json!({"seq": 2, "v": "lo"}));
        processor.process(&json!({"type": "stream_end", "id": "a"}));

        let placeholder = next_processed(&mut sub).await;
        assert_eq!(placeholder.status, MessageStatus::Streaming);
        assert_eq!(placeholder.text.as_deref(), Some(""));

        let after_first = next_processed(&mut sub).await;
        assert_eq!(after_first.text.as_deref(), Some("Hel"));

        let after_second = next_processed(&mut sub).await;
        assert_eq!(after_second.text.as_deref(), Some("Hello"));

        let finalized = next_processed(&mut sub).await;
        assert_eq!(finalized.status, MessageStatus::Delivered);
        assert_eq!(finalized.text.as_deref(), Some("Hello"));
        assert_eq!(finalized.id, "msg_a");
    }

    #[tokio::test]
    async fn out_of_order_deltas_are_buffered_and_applied_once_contiguous() {
        let (processor, mut sub) = processor();

        processor.process(&json!({"type": "stream_start", "id": "b"}));
        processor.process(&json!({"seq": 1, "v": "One"}));
        let placeholder = next_processed(&mut sub).await;
        assert_eq!(placeholder.text.as_deref(), Some(""));

        // seq 1 applied first (in order), then 3 arrives ahead of 2.
        let after_one = next_processed(&mut sub).await;
        assert_eq!(after_one.text.as_deref(), Some("One"));

        processor.process(&json!({"seq": 3, "v": "Three"}));
        processor.process(&json!({"seq": 2, "v": "Two"}));

        let after_two = next_processed(&mut sub).await;
        assert_eq!(after_two.text.as_deref(), Some("OneTwo"));
        let after_three = next_processed(&mut sub).await;
        assert_eq!(after_three.text.as_deref(), Some("OneTwoThree"));
    }

    #[tokio::test]
    async fn synthetic_stream_applies_the_triggering_delta() {
        let (processor, mut sub) = processor();

        // No stream_start at all.
        processor.process(&json!({"seq": 1, "v": "Surprise", "id": "c"}));

        let placeholder = next_processed(&mut sub).await;
        assert_eq!(placeholder.status, MessageStatus::Streaming);
        assert_eq!(placeholder.text.as_deref(), Some(""));

        let applied = next_processed(&mut sub).await;
        assert_eq!(applied.text.as_deref(), Some("Surprise"));
    }

    #[tokio::test]
    async fn duplicate_text_is_suppressed_with_no_event() {
        let (processor, mut sub) = processor();

        processor.process(&json!({"type": "message", "message": {"id": "m1", "type": "text", "text": "Hi"}}));
        let first = next_processed(&mut sub).await;
        assert_eq!(first.text.as_deref(), Some("Hi"));

        processor.process(&json!({"type": "message", "message": {"id": "m2", "type": "text", "text": "Hi"}}));

        // No further event should arrive; confirm by sending a distinguishable
        // follow-up and checking it's the very next thing observed.
        processor.process(&json!({"type": "message", "message": {"id": "m3", "type": "text", "text": "Bye"}}));
        let next = next_processed(&mut sub).await;
        assert_eq!(next.text.as_deref(), Some("Bye"));
    }

    #[tokio::test]
    async fn message_received_fires_even_for_a_frame_that_is_then_deduped() {
        let (processor, mut sub) = processor();

        processor.process(&json!({"type": "message", "message": {"id": "m1", "type": "text", "text": "Hi"}}));
        assert_eq!(sub.recv().await.unwrap().name(), "message:received");
        assert_eq!(next_processed(&mut sub).await.text.as_deref(), Some("Hi"));

        processor.process(&json!({"type": "message", "message": {"id": "m2", "type": "text", "text": "Hi"}}));
        // Suppressed: received still fires, but no processed follows it.
        assert_eq!(sub.recv().await.unwrap().name(), "message:received");
    }

    #[tokio::test]
    async fn stale_seq_does_not_mutate_stream_state() {
        let (processor, mut sub) = processor();
        processor.process(&json!({"type": "stream_start", "id": "d"}));
        processor.process(&json!({"seq": 1, "v": "A"}));
        let _placeholder = next_processed(&mut sub).await;
        let _after_first = next_processed(&mut sub).await;

        // Replaying seq 1 must not re-append or emit.
        processor.process(&json!({"seq": 1, "v": "A"}));
        processor.process(&json!({"seq": 2, "v": "B"}));
        let after_second = next_processed(&mut sub).await;
        assert_eq!(after_second.text.as_deref(), Some("AB"));
    }

    #[tokio::test]
    async fn stream_start_without_an_id_emits_a_protocol_error_and_opens_no_stream() {
        let (processor, mut sub) = processor();
        processor.process(&json!({"type": "stream_start"}));

        match sub.recv().await.unwrap() {
            WebchatEvent::Error { message, recoverable } => {
                assert!(message.contains("stream_start"));
                assert!(recoverable);
            }
            other => panic!("expected an error event, got {other:?}"),
        }

        // No stream was opened, so a subsequent delta is treated as a fresh
        // synthetic stream rather than continuing a half-open one.
        processor.process(&json!({"seq": 1, "v": "hi", "id": "z"}));
        let placeholder = next_processed(&mut sub).await;
        assert_eq!(placeholder.id, "msg_z");
    }

    #[tokio::test]
    async fn stream_end_without_an_id_emits_a_protocol_error() {
        let (processor, mut sub) = processor();
        processor.process(&json!({"type": "stream_end"}));

        match sub.recv().await.unwrap() {
            WebchatEvent::Error { message, recoverable } => {
                assert!(message.contains("stream_end"));
                assert!(recoverable);
            }
            other => panic!("expected an error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_end_with_no_active_stream_still_emits_an_empty_final_message() {
        let (processor, mut sub) = processor();
        processor.process(&json!({"type": "stream_end", "id": "ghost"}));

        let final_message = next_processed(&mut sub).await;
        assert_eq!(final_message.id, "msg_ghost");
        assert_eq!(final_message.text.as_deref(), Some(""));
        assert_eq!(final_message.status, MessageStatus::Delivered);
    }

    #[tokio::test(start_paused = true)]
    async fn typing_start_auto_clears_after_the_timeout() {
        let (processor, mut sub) = processor();
        processor.process(&json!({"type": "typing_start"}));
        assert_eq!(sub.recv().await.unwrap().name(), "typing:start");

        tokio::time::advance(Duration::from_secs(16)).await;
        tokio::task::yield_now().await;
        assert_eq!(sub.recv().await.unwrap().name(), "typing:stop");
    }

    #[tokio::test]
    async fn typing_indicator_is_allowed_before_the_first_delta_but_cleared_by_it() {
        let (processor, mut sub) = processor();
        processor.process(&json!({"type": "stream_start", "id": "e"}));
        processor.process(&json!({"type": "typing_start"}));
        assert_eq!(sub.recv().await.unwrap().name(), "typing:start");

        processor.process(&json!({"seq": 1, "v": "hi"}));
        assert_eq!(sub.recv().await.unwrap().name(), "typing:stop");

        let placeholder = next_processed(&mut sub).await;
        assert_eq!(placeholder.status, MessageStatus::Streaming);
    }

    #[tokio::test]
    async fn typing_indicator_is_dropped_once_a_delta_has_already_been_applied() {
        let (processor, mut sub) = processor();
        processor.process(&json!({"type": "stream_start", "id": "f"}));
        processor.process(&json!({"seq": 1, "v": "hi"}));
        let _placeholder = next_processed(&mut sub).await;
        let _after_first = next_processed(&mut sub).await;

        // Content has already started flowing: a fresh typing_start here is
        // stale and must be dropped outright.
        processor.process(&json!({"type": "typing_start"}));
        processor.process(&json!({"seq": 2, "v": " there"}));
        let after_second = next_processed(&mut sub).await;
        assert_eq!(after_second.text.as_deref(), Some("hi there"));
    }

    #[tokio::test]
    async fn typing_start_from_ai_assistant_raises_the_thinking_indicator() {
        let (processor, mut sub) = processor();
        processor.process(&json!({"type": "typing_start", "from": "ai-assistant"}));
        assert_eq!(sub.recv().await.unwrap().name(), "thinking:start");
    }

    #[tokio::test]
    async fn typing_and_thinking_indicators_are_independent() {
        let (processor, mut sub) = processor();
        processor.process(&json!({"type": "typing_start", "from": "ai-assistant"}));
        assert_eq!(sub.recv().await.unwrap().name(), "thinking:start");
        processor.process(&json!({"type": "typing_start"}));
        assert_eq!(sub.recv().await.unwrap().name(), "typing:start");

        // A non-streamed message clears both indicators.
        processor.process(&json!({"type": "message", "message": {"id": "m1", "type": "text", "text": "hi"}}));
        let mut seen = std::collections::HashSet::new();
        for _ in 0..2 {
            seen.insert(sub.recv().await.unwrap().name());
        }
        assert!(seen.contains("typing:stop"));
        assert!(seen.contains("thinking:stop"));
    }
}
