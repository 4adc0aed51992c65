//! Newline framing for the diagnostics stream
//!
//! `rc --diagnostics --json` writes one JSON document per line, but pipe reads
//! split those lines arbitrarily. Chunks are accumulated as bytes so a UTF-8
//! sequence split across reads is decoded intact.

use tracing::{trace, warn};

/// Longest line kept while waiting for its newline
const MAX_LINE_SIZE: usize = 16 * 1024 * 1024; // 16MB

/// Accumulates chunks and yields complete lines
#[derive(Debug, Default)]
pub struct LineFraming {
    /// Bytes after the last newline seen
    receive_buffer: Vec<u8>,
}

impl LineFraming {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed
    ///
    /// A trailing `\r` is stripped and blank lines are dropped. The bytes after
    /// the last newline stay buffered for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.receive_buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.receive_buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let mut line = &self.receive_buffer[start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                lines.push(String::from_utf8_lossy(line).into_owned());
            }
            start = end + 1;
        }
        self.receive_buffer.drain(..start);

        if self.receive_buffer.len() > MAX_LINE_SIZE {
            warn!(
                "LineFraming: discarding {} bytes without a newline",
                self.receive_buffer.len()
            );
            self.receive_buffer.clear();
        }

        trace!(
            "LineFraming: {} complete line(s), {} byte(s) pending",
            lines.len(),
            self.receive_buffer.len()
        );
        lines
    }

    /// Bytes waiting for a newline
    pub fn pending(&self) -> usize {
        self.receive_buffer.len()
    }
}
