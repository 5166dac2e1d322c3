//! Server-sent-event relay for streamed chat completions.
//!
//! Upstream chunks arrive with arbitrary boundaries: a line (or a multi-byte
//! character) may be split across chunks. [`SseFramer`] buffers raw bytes and only
//! decodes complete lines, and [`relay`] turns an upstream byte stream into
//! normalised `data: ...\n\n` frames.

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt::Display;

pub const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// A JSON chunk, kept as the original text.
    Data(String),
    Done,
}

impl SseEvent {
    pub fn to_frame(&self) -> Bytes {
        match self {
            SseEvent::Data(json) => Bytes::from(format!("data: {}\n\n", json)),
            SseEvent::Done => Bytes::from(format!("data: {}\n\n", DONE_MARKER)),
        }
    }
}

/// Longest line the framer buffers; longer lines are dropped.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Incremental line splitter for an SSE byte stream.
#[derive(Debug, Default)]
pub struct SseFramer {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no newline.
    scanned: usize,
    /// Set while skipping the rest of an oversized line.
    discarding: bool,
    done: bool,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `[DONE]` was seen; later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Bytes held for the current incomplete line.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds a chunk and returns the events of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut line_start = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let line_end = self.scanned + offset;
            self.scanned = line_end + 1;

            let line = &self.buffer[line_start..line_end];
            line_start = line_end + 1;
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if line.len() > MAX_LINE_BYTES {
                tracing::warn!("Dropping SSE line of {} bytes", line.len());
                continue;
            }
            if let Some(event) = parse_line(line) {
                let finished = event == SseEvent::Done;
                events.push(event);
                if finished {
                    self.done = true;
                    self.buffer.clear();
                    self.scanned = 0;
                    return events;
                }
            }
        }

        self.buffer.drain(..line_start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > MAX_LINE_BYTES {
            if !self.discarding {
                tracing::warn!(
                    "SSE line exceeds {} bytes without a newline, dropping it",
                    MAX_LINE_BYTES
                );
            }
            self.buffer.clear();
            self.scanned = 0;
            self.discarding = true;
        }
        events
    }

    /// Flushes a final line that had no trailing newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        if self.done || std::mem::take(&mut self.discarding) || line.is_empty() {
            return Vec::new();
        }
        let event = parse_line(&line);
        if event == Some(SseEvent::Done) {
            self.done = true;
        }
        event.into_iter().collect()
    }
}

fn parse_line(raw: &[u8]) -> Option<SseEvent> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    if raw.is_empty() || raw.starts_with(b":") {
        return None;
    }

    let line = match std::str::from_utf8(raw) {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!("Skipping non UTF-8 SSE line: {}", e);
            return None;
        }
    };

    let payload = line.strip_prefix("data:")?.trim();
    if payload == DONE_MARKER {
        return Some(SseEvent::Done);
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(_) => Some(SseEvent::Data(payload.to_string())),
        Err(e) => {
            tracing::warn!("Skipping unparsable SSE data line ({}): {}", e, payload);
            None
        }
    }
}

struct RelayState<E> {
    upstream: BoxStream<'static, Result<Bytes, E>>,
    framer: SseFramer,
    pending: VecDeque<Bytes>,
    exhausted: bool,
}

impl<E> RelayState<E> {
    fn enqueue(&mut self, events: Vec<SseEvent>) {
        self.pending.extend(events.iter().map(SseEvent::to_frame));
    }
}

/// Re-frames an upstream SSE byte stream. Frames are emitted as soon as their line is
/// complete; the stream ends after `[DONE]` or when the upstream ends (or fails).
pub fn relay<S, E>(upstream: S) -> impl Stream<Item = Result<Bytes, Infallible>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = RelayState {
        upstream: upstream.boxed(),
        framer: SseFramer::new(),
        pending: VecDeque::new(),
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.pending.pop_front() {
                return Some((Ok(frame), state));
            }
            if state.exhausted || state.framer.is_done() {
                return None;
            }

            match state.upstream.next().await {
                Some(Ok(chunk)) => {
                    let events = state.framer.push(&chunk);
                    state.enqueue(events);
                }
                Some(Err(e)) => {
                    tracing::error!("AI gateway stream interrupted: {}", e);
                    state.exhausted = true;
                }
                None => {
                    let events = state.framer.finish();
                    state.enqueue(events);
                    state.exhausted = true;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(json: &str) -> SseEvent {
        SseEvent::Data(json.to_string())
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"data: {\"choices\":[{\"del").is_empty());
        let events = framer.push(b"ta\":{\"content\":\"Oi\"}}]}\n\n");
        assert_eq!(
            events,
            vec![data(r#"{"choices":[{"delta":{"content":"Oi"}}]}"#)]
        );
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let line = "data: {\"c\":\"Belém\"}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut framer = SseFramer::new();
        assert!(framer.push(&line[..split]).is_empty());
        assert_eq!(framer.push(&line[split..]), vec![data(r#"{"c":"Belém"}"#)]);
    }

    #[test]
    fn test_crlf_comments_and_blank_lines() {
        let mut framer = SseFramer::new();
        let events = framer.push(b": keep-alive\r\n\r\nevent: message\r\ndata: {\"a\":1}\r\n\r\n");
        assert_eq!(events, vec![data(r#"{"a":1}"#)]);
    }

    #[test]
    fn test_done_terminates() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"data: {\"a\":1}\ndata: [DONE]\ndata: {\"b\":2}\n");
        assert_eq!(events, vec![data(r#"{"a":1}"#), SseEvent::Done]);
        assert!(framer.is_done());
        assert!(framer.push(b"data: {\"c\":3}\n").is_empty());
        assert!(framer.finish().is_empty());
    }

    #[test]
    fn test_invalid_json_skipped() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"data: {not json\ndata: {\"ok\":true}\n");
        assert_eq!(events, vec![data(r#"{"ok":true}"#)]);
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"data: {\"tail\":1}").is_empty());
        assert_eq!(framer.finish(), vec![data(r#"{"tail":1}"#)]);
        assert!(framer.finish().is_empty());
    }

    #[test]
    fn test_many_small_chunks_scan_incrementally() {
        let line = b"data: {\"content\":\"energia solar em Santar\xc3\xa9m\"}\n";
        let mut framer = SseFramer::new();
        let mut events = Vec::new();
        for byte in line.iter() {
            events.extend(framer.push(std::slice::from_ref(byte)));
        }
        assert_eq!(events, vec![data(r#"{"content":"energia solar em Santarém"}"#)]);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn test_unterminated_oversized_line_is_dropped() {
        let mut framer = SseFramer::new();
        let mut huge = b"data: {\"x\":\"".to_vec();
        huge.resize(MAX_LINE_BYTES + 10, b'a');

        assert!(framer.push(&huge).is_empty());
        assert_eq!(framer.pending_len(), 0);
        // The rest of the oversized line keeps being dropped until its newline.
        assert!(framer.push(b"aaaa\"}").is_empty());
        assert!(framer.pending_len() <= 6);
        let events = framer.push(b"\ndata: {\"ok\":1}\n");
        assert_eq!(events, vec![data(r#"{"ok":1}"#)]);
        assert!(!framer.is_done());
    }

    #[test]
    fn test_oversized_tail_is_not_flushed() {
        let mut framer = SseFramer::new();
        let mut huge = b"data: ".to_vec();
        huge.resize(MAX_LINE_BYTES + 1, b'1');
        assert!(framer.push(&huge).is_empty());
        assert!(framer.push(b"111").is_empty());
        assert!(framer.finish().is_empty());
    }

    #[test]
    fn test_complete_oversized_line_is_dropped() {
        let mut framer = SseFramer::new();
        let mut input = b"data: {\"x\":\"".to_vec();
        input.resize(MAX_LINE_BYTES + 1, b'a');
        input.extend_from_slice(b"\"}\ndata: [DONE]\n");
        assert_eq!(framer.push(&input), vec![SseEvent::Done]);
    }

    #[tokio::test]
    async fn test_relay_reframes_stream() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"n\":1}\n\nda")),
            Ok(Bytes::from_static(b"ta: {\"n\":2}\n\n: ping\n")),
            Ok(Bytes::from_static(b"data: [DONE]\n\ndata: {\"n\":3}\n\n")),
        ];

        let frames: Vec<Bytes> = relay(stream::iter(chunks))
            .map(|item| match item {
                Ok(bytes) => bytes,
                Err(never) => match never {},
            })
            .collect()
            .await;

        assert_eq!(
            frames,
            vec![
                Bytes::from_static(b"data: {\"n\":1}\n\n"),
                Bytes::from_static(b"data: {\"n\":2}\n\n"),
                Bytes::from_static(b"data: [DONE]\n\n"),
            ]
        );
    }

    #[tokio::test]
    async fn test_relay_stops_on_upstream_error() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"n\":1}\n")),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "reset")),
            Ok(Bytes::from_static(b"data: {\"n\":2}\n")),
        ];
        let frames: Vec<_> = relay(stream::iter(chunks)).collect().await;
        assert_eq!(frames.len(), 1);
    }
}
