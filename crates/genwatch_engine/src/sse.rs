use bytes::BytesMut;

use crate::{BackendError, FailureKind};

/// Largest event, or unterminated line, the decoder buffers before giving up.
pub const MAX_EVENT_BYTES: usize = 1 << 20;

/// Incremental `text/event-stream` decoder.
///
/// Feed raw body chunks with [`SseDecoder::push`]; each returned string is
/// the joined `data:` payload of one dispatched event. Chunk boundaries may
/// fall anywhere, including inside a UTF-8 sequence.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: BytesMut,
    data: Vec<String>,
    data_len: usize,
    limit: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_EVENT_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            data: Vec::new(),
            data_len: 0,
            limit,
        }
    }

    /// Decodes every event completed by `chunk`. Fails with a decode error
    /// once a pending line or event grows past the limit.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, BackendError> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line = self.buffer.split_to(newline + 1);
            line.truncate(newline);
            if line.last() == Some(&b'\r') {
                line.truncate(newline - 1);
            }
            if let Some(event) = self.feed_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
            if self.data_len > self.limit {
                return Err(self.overflow("event"));
            }
        }
        if self.buffer.len() > self.limit {
            return Err(self.overflow("line"));
        }
        Ok(events)
    }

    fn overflow(&mut self, what: &str) -> BackendError {
        self.buffer.clear();
        self.data.clear();
        self.data_len = 0;
        BackendError::new(
            FailureKind::Decode,
            format!("stream {what} exceeds {} bytes", self.limit),
        )
    }

    /// Flushes a trailing event left unterminated when the body ended.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            if let Some(event) = self.feed_line(&String::from_utf8_lossy(&rest)) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn feed_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        // `event`, `id` and `retry` carry nothing the question stream uses.
        if field == "data" {
            self.data_len += value.len() + 1;
            self.data.push(value.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        self.data_len = 0;
        Some(payload)
    }
}
