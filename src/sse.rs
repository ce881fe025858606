//! Incremental server-sent events decoder.
//!
//! Bytes are fed in arbitrary chunks; lines may end in LF, CR, or CRLF, and a
//! CRLF pair may be split across two chunks. An empty line dispatches the
//! event accumulated so far.

use crate::error::{InferenceError, Result};
use crate::transport::ByteStream;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::collections::VecDeque;

/// Data payload that terminates a generation stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Upper bound on a pending line plus the event data accumulated so far.
pub const MAX_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

impl SseEvent {
    pub fn is_done(&self) -> bool {
        self.data.trim() == DONE_SENTINEL
    }
}

/// Byte-level SSE parser.
#[derive(Debug, Default)]
pub struct SseParser {
    line: Vec<u8>,
    /// Previous chunk ended on CR; a leading LF in the next chunk belongs to it.
    skip_lf: bool,
    started: bool,
    current: SseEvent,
    has_data: bool,
    dirty: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event completed by it.
    ///
    /// Fails once the pending line and event data exceed [`MAX_BUFFER_SIZE`].
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>> {
        let mut events = Vec::new();
        let mut bytes = chunk;
        if !self.started && !bytes.is_empty() {
            self.started = true;
            bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        }

        for &byte in bytes {
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\r' => {
                    self.skip_lf = true;
                    self.end_line(&mut events);
                }
                b'\n' => self.end_line(&mut events),
                _ => self.line.push(byte),
            }
        }
        if self.line.len() + self.current.data.len() > MAX_BUFFER_SIZE {
            return Err(InferenceError::provider_output(format!(
                "Event stream exceeded {MAX_BUFFER_SIZE} bytes without an event boundary"
            )));
        }
        Ok(events)
    }

    /// Flush a trailing line and any partially accumulated event at end of
    /// stream.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            self.process_line(&line);
        }
        self.take_event()
    }

    fn end_line(&mut self, events: &mut Vec<SseEvent>) {
        if self.line.is_empty() {
            events.extend(self.take_event());
            return;
        }
        let line = std::mem::take(&mut self.line);
        self.process_line(&line);
    }

    fn process_line(&mut self, line: &[u8]) {
        if line.first() == Some(&b':') {
            return;
        }
        let line = String::from_utf8_lossy(line);
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_ref(), ""),
        };

        match field {
            "data" => {
                if self.has_data {
                    self.current.data.push('\n');
                }
                self.current.data.push_str(value);
                self.has_data = true;
            }
            "event" => self.current.event = Some(value.to_string()),
            "id" if !value.contains('\0') => self.current.id = Some(value.to_string()),
            "retry" => match value.parse() {
                Ok(retry) => self.current.retry = Some(retry),
                Err(_) => return,
            },
            _ => return,
        }
        self.dirty = true;
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        self.has_data = false;
        Some(std::mem::take(&mut self.current))
    }
}

struct DecodeState {
    body: ByteStream,
    parser: SseParser,
    queue: VecDeque<SseEvent>,
    finished: bool,
}

/// Decode a response body into a lazy stream of SSE events.
///
/// A transport error is yielded once and ends the stream.
pub fn decode_events(body: ByteStream) -> BoxStream<'static, Result<SseEvent>> {
    let state = DecodeState {
        body,
        parser: SseParser::new(),
        queue: VecDeque::new(),
        finished: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.queue.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => match state.parser.feed(&chunk) {
                    Ok(events) => state.queue.extend(events),
                    Err(e) => {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                },
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.finished = true;
                    let last = state.parser.finish();
                    state.queue.extend(last);
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    const FIXTURE: &str = "event: message\ndata: {\"a\":1}\nid: 7\nretry: 1500\n\n\
                           : keep-alive comment\n\
                           data: first\ndata: second\n\n\
                           data: [DONE]\n\n";

    fn feed_in_chunks(input: &[u8], size: usize) -> Vec<SseEvent> {
        let mut parser = SseParser::new();
        let mut events = Vec::new();
        for chunk in input.chunks(size) {
            events.extend(parser.feed(chunk).unwrap());
        }
        events.extend(parser.finish());
        events
    }

    #[test]
    fn parses_all_fields() {
        let events = feed_in_chunks(FIXTURE.as_bytes(), FIXTURE.len());
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event.as_deref(), Some("message"));
        assert_eq!(events[0].data, "{\"a\":1}");
        assert_eq!(events[0].id.as_deref(), Some("7"));
        assert_eq!(events[0].retry, Some(1500));
        assert_eq!(events[1].data, "first\nsecond");
        assert!(events[2].is_done());
    }

    #[test]
    fn chunk_boundaries_do_not_change_output() {
        let expected = feed_in_chunks(FIXTURE.as_bytes(), FIXTURE.len());
        for size in 1..FIXTURE.len() {
            assert_eq!(feed_in_chunks(FIXTURE.as_bytes(), size), expected, "chunk size {size}");
        }
    }

    #[test]
    fn crlf_and_cr_line_endings() {
        let crlf = "data: a\r\n\r\ndata: b\r\rdata: c\n\n";
        for size in 1..=crlf.len() {
            let events = feed_in_chunks(crlf.as_bytes(), size);
            let data: Vec<_> = events.iter().map(|e| e.data.as_str()).collect();
            assert_eq!(data, vec!["a", "b", "c"], "chunk size {size}");
        }
    }

    #[test]
    fn split_crlf_is_a_single_line_break() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: x\r").unwrap().is_empty());
        // The LF completes the CRLF; only the following blank line dispatches.
        assert!(parser.feed(b"\n").unwrap().is_empty());
        let events = parser.feed(b"\r\n").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn invalid_retry_is_ignored() {
        let events = feed_in_chunks(b"retry: soon\ndata: x\n\n", 64);
        assert_eq!(events[0].retry, None);
    }

    #[test]
    fn leading_bom_is_skipped() {
        let events = feed_in_chunks(b"\xEF\xBB\xBFdata: x\n\n", 64);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn unbounded_line_is_rejected() {
        let mut parser = SseParser::new();
        let chunk = vec![b'a'; 1024 * 1024];
        for _ in 0..10 {
            assert!(parser.feed(&chunk).unwrap().is_empty());
        }
        let err = parser.feed(b"data: more").unwrap_err();
        assert!(matches!(err, InferenceError::ProviderOutput(_)));
    }

    #[tokio::test]
    async fn oversized_event_ends_the_stream() {
        let big = Bytes::from(vec![b'x'; MAX_BUFFER_SIZE + 1]);
        let chunks = vec![
            Ok(Bytes::from_static(b"data: one\n\n")),
            Ok(big),
            Ok(Bytes::from_static(b"\n\ndata: two\n\n")),
        ];
        let events: Vec<_> = decode_events(stream::iter(chunks).boxed()).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().data, "one");
        assert!(events[1].is_err());
    }

    #[tokio::test]
    async fn decode_events_flushes_unterminated_event() {
        let chunks = vec![
            Ok(Bytes::from_static(b"data: one\n\nda")),
            Ok(Bytes::from_static(b"ta: two")),
        ];
        let events: Vec<_> = decode_events(stream::iter(chunks).boxed())
            .map(|e| e.unwrap().data)
            .collect()
            .await;
        assert_eq!(events, vec!["one", "two"]);
    }
}
