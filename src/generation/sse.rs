//! Incremental decoding of an upstream `text/event-stream` body
//!
//! Bytes arrive in arbitrary chunks. The decoder buffers partial lines and
//! yields the joined `data:` payload of every complete event.

use bytes::BytesMut;

/// Buffers raw body bytes and yields one payload per SSE event
#[derive(Debug, Default)]
pub struct DataLineDecoder {
    buffer: BytesMut,
    data: Vec<String>,
}

impl DataLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning the payloads of events completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            let line = &line[..pos];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if let Some(payload) = self.take_line(line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush a trailing unterminated line and any pending event
    pub fn finish(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            let line = rest.strip_suffix(b"\r").unwrap_or(&rest[..]);
            if let Some(payload) = self.take_line(line) {
                payloads.push(payload);
            }
        }
        if let Some(payload) = self.dispatch() {
            payloads.push(payload);
        }
        payloads
    }

    fn take_line(&mut self, line: &[u8]) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }

        let line = match std::str::from_utf8(line) {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!("Skipping non UTF-8 upstream line: {}", e);
                return None;
            }
        };

        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            self.data.push(value.to_string());
        }
        // Comments (":") and event/id/retry fields carry nothing we use.
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        Some(payload)
    }
}
