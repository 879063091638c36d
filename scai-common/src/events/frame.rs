//! Incremental Server-Sent Events frame decoder
//!
//! Bytes arrive in arbitrary chunks from the transport. The decoder buffers partial
//! lines, assembles `data:` lines into frames on each blank line, and decodes every
//! frame as JSON. A malformed frame is reported and skipped; later frames decode normally.

use super::StreamEvent;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Upper bound for one frame (and for an unterminated line in the buffer)
///
/// `modified_graph_data` carries a whole city road network in a single frame, so the
/// default leaves ample headroom over realistic networks.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Per-frame decode failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Frame data exceeded the configured maximum
    OversizedFrame { size: usize, max: usize },
    /// Unterminated input exceeded the configured maximum, buffer discarded
    OversizedBuffer { size: usize, max: usize },
    /// Frame data was not valid UTF-8
    Utf8,
    /// Frame data was not a valid envelope
    Decode(String),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::OversizedFrame { size, max } => {
                write!(f, "frame of {size} bytes exceeds limit of {max}")
            }
            FrameError::OversizedBuffer { size, max } => {
                write!(f, "unterminated input of {size} bytes exceeds limit of {max}")
            }
            FrameError::Utf8 => f.write_str("frame is not valid UTF-8"),
            FrameError::Decode(msg) => write!(f, "malformed frame: {msg}"),
        }
    }
}

/// Result of feeding one chunk to the decoder
///
/// Frames and errors are kept in the order they appeared in the byte stream.
#[derive(Debug)]
pub struct DecodeReport<T> {
    pub items: Vec<Result<T, FrameError>>,
}

impl<T> Default for DecodeReport<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> DecodeReport<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Successfully decoded frames, in order
    pub fn frames(&self) -> impl Iterator<Item = &T> {
        self.items.iter().filter_map(|item| item.as_ref().ok())
    }

    /// Decode failures, in order
    pub fn errors(&self) -> impl Iterator<Item = &FrameError> {
        self.items.iter().filter_map(|item| item.as_ref().err())
    }

    fn push_frame(&mut self, frame: T) {
        self.items.push(Ok(frame));
    }

    fn push_error(&mut self, error: FrameError) {
        self.items.push(Err(error));
    }
}

impl<T> IntoIterator for DecodeReport<T> {
    type Item = Result<T, FrameError>;
    type IntoIter = std::vec::IntoIter<Result<T, FrameError>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// SSE decoder producing `T` (normally [`StreamEvent`]) per frame
pub struct SseFrameDecoder<T = StreamEvent> {
    max_frame_bytes: usize,
    pending: Vec<u8>,
    data: Vec<u8>,
    has_data: bool,
    discarding: bool,
    marker: PhantomData<T>,
}

impl<T> SseFrameDecoder<T> {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            pending: Vec::new(),
            data: Vec::new(),
            has_data: false,
            discarding: false,
            marker: PhantomData,
        }
    }
}

impl<T> Default for SseFrameDecoder<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl<T: DeserializeOwned> SseFrameDecoder<T> {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> DecodeReport<T> {
        let mut report = DecodeReport::default();
        if !chunk.is_empty() {
            self.pending.extend_from_slice(chunk);
        }

        while let Some(newline_idx) = self.pending.iter().position(|byte| *byte == b'\n') {
            let mut line = self.pending.drain(..=newline_idx).collect::<Vec<u8>>();
            line.pop();
            if line.ends_with(b"\r") {
                line.pop();
            }
            self.process_line(&line, &mut report);
        }

        if self.pending.len() > self.max_frame_bytes {
            report.push_error(FrameError::OversizedBuffer {
                size: self.pending.len(),
                max: self.max_frame_bytes,
            });
            self.pending.clear();
            self.reset_frame();
            self.discarding = true;
        }

        report
    }

    /// Flush a trailing frame that was not terminated by a blank line
    pub fn finish(&mut self) -> DecodeReport<T> {
        let mut report = DecodeReport::default();
        if !self.pending.is_empty() {
            let mut line = std::mem::take(&mut self.pending);
            if line.ends_with(b"\r") {
                line.pop();
            }
            self.process_line(&line, &mut report);
        }
        self.dispatch(&mut report);
        report
    }

    fn process_line(&mut self, line: &[u8], report: &mut DecodeReport<T>) {
        if line.is_empty() {
            self.dispatch(report);
            return;
        }
        if line[0] == b':' || self.discarding {
            return;
        }

        let (field, value) = match line.iter().position(|b| *b == b':') {
            Some(idx) => {
                let value = &line[idx + 1..];
                (&line[..idx], value.strip_prefix(b" ").unwrap_or(value))
            }
            None => (line, &[][..]),
        };

        // event:, id: and retry: carry nothing the envelope does not already have
        if field != b"data" {
            return;
        }

        if self.has_data {
            self.data.push(b'\n');
        }
        self.data.extend_from_slice(value);
        self.has_data = true;

        if self.data.len() > self.max_frame_bytes {
            report.push_error(FrameError::OversizedFrame {
                size: self.data.len(),
                max: self.max_frame_bytes,
            });
            self.reset_frame();
            self.discarding = true;
        }
    }

    fn dispatch(&mut self, report: &mut DecodeReport<T>) {
        self.discarding = false;
        if !self.has_data {
            return;
        }
        let data = std::mem::take(&mut self.data);
        self.has_data = false;

        let text = match std::str::from_utf8(&data) {
            Ok(text) => text,
            Err(_) => {
                report.push_error(FrameError::Utf8);
                return;
            }
        };
        match serde_json::from_str(text) {
            Ok(parsed) => report.push_frame(parsed),
            Err(err) => report.push_error(FrameError::Decode(err.to_string())),
        }
    }

    fn reset_frame(&mut self) {
        self.data.clear();
        self.has_data = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(json: &str) -> Vec<u8> {
        format!("data: {json}\n\n").into_bytes()
    }

    #[test]
    fn test_decodes_frames_split_across_chunks() {
        let bytes = frame(r#"{"type":"agent_complete","agent":"data_ingestion","status":"running"}"#);
        let (head, tail) = bytes.split_at(17);

        let mut decoder = SseFrameDecoder::<StreamEvent>::default();
        let first = decoder.push_chunk(head);
        assert!(first.is_empty());

        let second = decoder.push_chunk(tail);
        let frames: Vec<&StreamEvent> = second.frames().collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(second.errors().count(), 0);
        assert_eq!(frames[0].kind(), "agent_complete");
    }

    #[test]
    fn test_malformed_frame_does_not_poison_stream() {
        let mut chunk = Vec::new();
        chunk.extend_from_slice(&frame(r#"{"type":"start"}"#));
        chunk.extend_from_slice(b"data: {not json\n\n");
        chunk.extend_from_slice(&frame(r#"{"type":"complete"}"#));

        let mut decoder = SseFrameDecoder::<StreamEvent>::default();
        let report = decoder.push_chunk(&chunk);
        assert_eq!(report.items.len(), 3);
        assert!(matches!(report.items[0], Ok(StreamEvent::Start { .. })));
        match &report.items[1] {
            Err(FrameError::Decode(_)) => {}
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(matches!(&report.items[2], Ok(event) if event.is_terminal()));
    }

    #[test]
    fn test_crlf_comments_and_other_fields() {
        let raw = b": heartbeat\r\nevent: message\r\nid: 7\r\ndata: {\"type\":\"error\",\"message\":\"boom\"}\r\n\r\n";
        let mut decoder = SseFrameDecoder::<StreamEvent>::default();
        let report = decoder.push_chunk(raw);
        assert_eq!(
            report.items,
            vec![Ok(StreamEvent::Error {
                message: Some("boom".to_string())
            })]
        );
    }

    #[test]
    fn test_multi_line_data_is_joined() {
        let raw = b"data: {\"type\":\ndata: \"complete\"}\n\n";
        let mut decoder = SseFrameDecoder::<StreamEvent>::default();
        let report = decoder.push_chunk(raw);
        assert_eq!(report.items, vec![Ok(StreamEvent::Complete { message: None })]);
    }

    #[test]
    fn test_comment_only_block_yields_nothing() {
        let mut decoder = SseFrameDecoder::<StreamEvent>::default();
        let report = decoder.push_chunk(b": keep-alive\n\n\n");
        assert!(report.is_empty());
    }

    #[test]
    fn test_finish_flushes_unterminated_frame() {
        let mut decoder = SseFrameDecoder::<StreamEvent>::default();
        assert!(decoder.push_chunk(br#"data: {"type":"complete"}"#).is_empty());
        let report = decoder.finish();
        assert_eq!(report.frames().count(), 1);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_default_limit_admits_large_network_frame() {
        let padding = "x".repeat(12 * 1024 * 1024);
        let raw = format!(
            "data: {{\"type\":\"data\",\"key\":\"modified_graph_data\",\"data\":\"{padding}\"}}\n\n"
        );
        let mut decoder = SseFrameDecoder::<StreamEvent>::default();
        let report = decoder.push_chunk(raw.as_bytes());
        assert_eq!(report.errors().count(), 0);
        assert_eq!(report.frames().count(), 1);
    }

    #[test]
    fn test_oversized_frame_is_rejected_and_decoder_recovers() {
        let mut decoder = SseFrameDecoder::<StreamEvent>::new(32);
        let big = format!("data: {{\"type\":\"data\",\"key\":\"x\",\"data\":\"{}\"}}\n\n", "a".repeat(64));
        let report = decoder.push_chunk(big.as_bytes());
        assert_eq!(report.frames().count(), 0);
        assert!(matches!(report.items[0], Err(FrameError::OversizedFrame { max: 32, .. })));

        let report = decoder.push_chunk(&frame(r#"{"type":"complete"}"#));
        assert_eq!(report.frames().count(), 1);
    }

    #[test]
    fn test_oversized_unterminated_buffer_is_discarded() {
        let mut decoder = SseFrameDecoder::<StreamEvent>::new(16);
        let report = decoder.push_chunk(&[b'x'; 40]);
        assert!(matches!(report.items[0], Err(FrameError::OversizedBuffer { size: 40, max: 16 })));

        // The rest of the runaway line is still discarded up to the next blank line
        let report = decoder.push_chunk(b"tail\n\ndata: {\"type\":\"complete\"}\n\n");
        assert_eq!(report.frames().count(), 1);
        assert_eq!(report.errors().count(), 0);
    }

    #[test]
    fn test_items_keep_stream_order() {
        let mut chunk = frame(r#"{"type":"complete"}"#);
        chunk.extend_from_slice(b"data: {broken\n\n");

        let mut decoder = SseFrameDecoder::<StreamEvent>::default();
        let report = decoder.push_chunk(&chunk);
        assert_eq!(report.items.len(), 2);
        assert!(matches!(&report.items[0], Ok(event) if event.is_terminal()));
        assert!(matches!(report.items[1], Err(FrameError::Decode(_))));
    }
}
