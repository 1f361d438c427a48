//! Line splitting over raw channel bytes.
//!
//! Bytes are buffered until a `\n` arrives, so multi-byte UTF-8 sequences
//! split across network chunks are never decoded half-way. Both the frame
//! decoder and the upstream vendor parsers sit on top of this.

/// Accumulates bytes and hands out complete lines in arrival order.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, without the `\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(String::from_utf8_lossy(&self.buffer[start..end]).into_owned());
            start = end + 1;
        }
        self.buffer.drain(..start);
        lines
    }

    /// Take whatever incomplete line is left once the channel has closed.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        Some(rest)
    }
}

/// Payload of an SSE `data:` line, if the line is one.
///
/// At most one space after the colon belongs to the prefix.
pub fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}
