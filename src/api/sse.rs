//! Server-sent event decoding for `/chat/stream`.
//!
//! DESIGN
//! ======
//! `SseDecoder` is an incremental push parser: network chunks go in, whole
//! events come out, regardless of where the chunk boundaries fall (inside a
//! line, between CR and LF, or inside a UTF-8 sequence). `ChatStream` wraps
//! any byte stream with the decoder and maps events onto the chat protocol:
//! unnamed events carry answer text, the named `done` event carries the
//! session identifier.
//!
//! Dropping a `ChatStream` drops the underlying response body, which closes
//! the connection. That is the only cancellation primitive.

use std::collections::VecDeque;
use std::fmt;

use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};

use super::types::ApiError;

#[cfg(test)]
#[path = "sse_test.rs"]
mod sse_test;

// =============================================================================
// DECODER
// =============================================================================

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name; `None` for the default `message` type.
    pub event: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` parser.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    skip_lf: bool,
    event: Option<String>,
    data: String,
    has_data: bool,
}

impl SseDecoder {
    /// Feed raw bytes; returns every event completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        let mut out = Vec::new();
        for &byte in bytes {
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => self.end_line(&mut out),
                b'\r' => {
                    self.end_line(&mut out);
                    self.skip_lf = true;
                }
                _ => self.line.push(byte),
            }
        }
        out
    }

    fn end_line(&mut self, out: &mut Vec<SseEvent>) {
        let raw = std::mem::take(&mut self.line);
        let line = String::from_utf8_lossy(&raw);

        if line.is_empty() {
            self.dispatch(out);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (&*line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            // `id`, `retry` and unknown fields carry nothing the widget uses.
            _ => {}
        }
    }

    fn dispatch(&mut self, out: &mut Vec<SseEvent>) {
        let event = self.event.take();
        if !self.has_data {
            self.data.clear();
            return;
        }
        self.has_data = false;
        out.push(SseEvent {
            event: event.filter(|name| !name.is_empty()),
            data: std::mem::take(&mut self.data),
        });
    }
}

// =============================================================================
// CHAT STREAM
// =============================================================================

/// Event delivered by an open chat stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatStreamEvent {
    /// Incremental answer text, appended verbatim.
    Chunk(String),
    /// Terminal event; payload is the session identifier.
    Done(String),
    /// The server sent a named `error` event.
    ServerError(String),
}

impl ChatStreamEvent {
    /// Map a raw event onto the chat protocol. Unknown named events are dropped.
    #[must_use]
    pub fn from_sse(event: SseEvent) -> Option<Self> {
        match event.event.as_deref() {
            None | Some("message") => Some(Self::Chunk(event.data)),
            Some("done") => Some(Self::Done(event.data)),
            Some("error") => Some(Self::ServerError(event.data)),
            Some(_) => None,
        }
    }
}

/// Handle to an open chat stream.
pub struct ChatStream {
    inner: BoxStream<'static, Result<ChatStreamEvent, ApiError>>,
}

impl ChatStream {
    /// Wrap an already-decoded event stream.
    pub fn new<S>(events: S) -> Self
    where
        S: Stream<Item = Result<ChatStreamEvent, ApiError>> + Send + 'static,
    {
        Self { inner: events.boxed() }
    }

    /// Decode a raw `text/event-stream` body.
    pub fn from_bytes<S, B, E>(bytes: S) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let state = DecodeState {
            bytes: bytes.boxed(),
            decoder: SseDecoder::default(),
            ready: VecDeque::new(),
            failed: false,
        };
        Self::new(stream::unfold(state, |mut state| async move {
            loop {
                if let Some(event) = state.ready.pop_front() {
                    return Some((Ok(event), state));
                }
                if state.failed {
                    return None;
                }
                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        let events = state.decoder.feed(chunk.as_ref());
                        state.ready.extend(events.into_iter().filter_map(ChatStreamEvent::from_sse));
                    }
                    Some(Err(e)) => {
                        state.failed = true;
                        return Some((Err(ApiError::Stream(e.to_string())), state));
                    }
                    // An event still being assembled at EOF is discarded.
                    None => return None,
                }
            }
        }))
    }

    /// Next event in delivery order; `None` once the connection ended.
    pub async fn next_event(&mut self) -> Option<Result<ChatStreamEvent, ApiError>> {
        self.inner.next().await
    }

    /// Close the connection.
    pub fn close(self) {
        drop(self);
    }
}

impl fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatStream").finish_non_exhaustive()
    }
}

struct DecodeState<B, E> {
    bytes: BoxStream<'static, Result<B, E>>,
    decoder: SseDecoder,
    ready: VecDeque<ChatStreamEvent>,
    failed: bool,
}
