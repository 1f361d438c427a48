//! Wire framing for stage output.
//!
//! One text channel carries three kinds of frame:
//!
//! ```text
//! data: "fragment text, JSON string literal"\n\n
//! data: [DONE]\n\n
//! data: [ERROR] message\n\n
//! ```
//!
//! Exactly one `[DONE]` or `[ERROR]` frame ends a stream. Data payloads are
//! JSON string literals so that newlines, surrounding whitespace and sentinel
//! look-alikes inside a fragment survive the trip; a payload that is not a
//! valid JSON string is taken verbatim.

use async_stream::stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::providers::FragmentStream;
use crate::sse::{data_payload, LineSplitter};

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";
pub const ERROR_SENTINEL: &str = "[ERROR]";

const GENERIC_STREAM_ERROR: &str = "Stream processing failed";
const INCOMPLETE_STREAM: &str = "Stream ended before completion";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(String),
    Done,
    Error(String),
}

impl Frame {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::Done | Frame::Error(_))
    }

    /// Serialize to wire text, blank-line terminated.
    pub fn encode(&self) -> String {
        match self {
            Frame::Data(payload) => {
                let literal = serde_json::Value::from(payload.as_str()).to_string();
                format!("{}{}\n\n", DATA_PREFIX, literal)
            }
            Frame::Done => format!("{}{}\n\n", DATA_PREFIX, DONE_SENTINEL),
            Frame::Error(message) => {
                let flat = message.split_whitespace().collect::<Vec<_>>().join(" ");
                format!("{}{} {}\n\n", DATA_PREFIX, ERROR_SENTINEL, flat)
            }
        }
    }
}

/// Unwrap provider fragments that arrive already wrapped in `data:` lines.
///
/// Some OpenAI-compatible gateways proxy an SSE body verbatim, so a single
/// "fragment" can look like `data: Hel\n\ndata: lo\n\n`, sometimes with the
/// newlines escaped. An empty return value means "emit nothing".
pub fn normalize_chunk(chunk: &str) -> String {
    if chunk.is_empty() {
        return String::new();
    }

    if let Some(nested) = nested_payload(chunk) {
        return nested;
    }

    match chunk.strip_prefix(DATA_PREFIX) {
        Some(rest) => rest.to_string(),
        None => chunk.to_string(),
    }
}

fn nested_payload(input: &str) -> Option<String> {
    let decoded = input.replace("\\r\\n", "\n").replace("\\n", "\n");
    let data_lines: Vec<&str> = decoded
        .split('\n')
        .map(str::trim)
        .filter(|line| line.starts_with(DATA_PREFIX))
        .collect();

    if data_lines.is_empty() {
        return None;
    }

    let payload: String = data_lines
        .into_iter()
        .map(|line| &line[DATA_PREFIX.len()..])
        .filter(|p| !p.is_empty() && *p != DONE_SENTINEL && !p.starts_with(ERROR_SENTINEL))
        .collect();

    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

/// Turn a provider fragment stream into encoded frames.
///
/// Emits one data frame per non-empty normalized fragment, then `[DONE]`; a
/// failure from the adapter becomes a single `[ERROR]` frame and ends output.
pub fn encode_fragments(fragments: FragmentStream) -> impl Stream<Item = String> + Send {
    stream! {
        let mut fragments = fragments;
        let mut sent = 0usize;
        while let Some(item) = fragments.next().await {
            match item {
                Ok(raw) => {
                    let payload = normalize_chunk(&raw);
                    if payload.is_empty() {
                        continue;
                    }
                    sent += 1;
                    yield Frame::Data(payload).encode();
                }
                Err(err) => {
                    warn!(provider = %err.provider, frames = sent, "provider stream failed: {}", err.message);
                    yield Frame::Error(err.message).encode();
                    return;
                }
            }
        }
        debug!(frames = sent, "stream complete");
        yield Frame::Done.encode();
    }
}

/// Incremental frame decoder over raw channel bytes.
///
/// Nothing is produced after the first terminal frame.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    lines: LineSplitter,
    terminated: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Feed a chunk of bytes; returns the frames it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        if self.terminated {
            return Vec::new();
        }
        let lines = self.lines.push(chunk);
        self.collect(lines)
    }

    /// Flush the trailing partial line after the channel closed.
    pub fn finish(&mut self) -> Vec<Frame> {
        if self.terminated {
            return Vec::new();
        }
        let tail = self.lines.finish().into_iter().collect();
        self.collect(tail)
    }

    fn collect(&mut self, lines: Vec<String>) -> Vec<Frame> {
        let mut frames = Vec::new();
        for line in lines {
            let Some(frame) = decode_line(&line) else {
                continue;
            };
            let terminal = frame.is_terminal();
            frames.push(frame);
            if terminal {
                self.terminated = true;
                break;
            }
        }
        frames
    }
}

fn decode_line(line: &str) -> Option<Frame> {
    let payload = data_payload(line)?;
    let marker = payload.trim();

    if marker.is_empty() {
        return None;
    }
    if marker == DONE_SENTINEL {
        return Some(Frame::Done);
    }
    if let Some(rest) = marker.strip_prefix(ERROR_SENTINEL) {
        let message = rest.trim();
        let message = if message.is_empty() {
            GENERIC_STREAM_ERROR
        } else {
            message
        };
        return Some(Frame::Error(message.to_string()));
    }

    let text = if marker.starts_with('"') {
        serde_json::from_str::<String>(marker).unwrap_or_else(|_| payload.to_string())
    } else {
        payload.to_string()
    };

    if text.is_empty() {
        None
    } else {
        Some(Frame::Data(text))
    }
}

/// Decode a byte channel into fragment text, in arrival order.
///
/// An `[ERROR]` frame yields one `StreamProtocol` error and ends the stream;
/// so does a channel that closes without any terminal frame.
pub fn decode_stream<S>(bytes: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    stream! {
        let mut bytes = Box::pin(bytes);
        let mut decoder = FrameDecoder::new();
        let mut closed = false;

        while !closed && !decoder.is_terminated() {
            let frames = match bytes.next().await {
                Some(Ok(chunk)) => decoder.push(&chunk),
                Some(Err(err)) => {
                    yield Err(err);
                    return;
                }
                None => {
                    closed = true;
                    decoder.finish()
                }
            };

            for frame in frames {
                match frame {
                    Frame::Data(text) => yield Ok(text),
                    Frame::Done => {}
                    Frame::Error(message) => {
                        yield Err(PipelineError::StreamProtocol(message));
                        return;
                    }
                }
            }
        }

        if !decoder.is_terminated() {
            yield Err(PipelineError::StreamProtocol(INCOMPLETE_STREAM.to_string()));
        }
    }
}
