//! Line-buffered decoding of streamed completions.
//!
//! Ollama streams newline-delimited JSON; OpenAI-compatible providers stream
//! Server-Sent Events (`data: {...}` lines ending with `data: [DONE]`). Both
//! are line framed, so one decoder handles both. Bytes are buffered until a
//! full line arrives, which also keeps multi-byte UTF-8 characters that
//! straddle a chunk boundary intact.

use serde_json::Value;

/// How lines are framed in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One JSON object per line (Ollama).
    Ndjson,
    /// `data:` lines, `event:` lines ignored, `[DONE]` terminator (OpenAI, Groq).
    Sse,
}

/// Buffered decoder for streamed JSON lines.
///
/// # Example
///
/// ```
/// use article_crew::streaming::{Framing, StreamDecoder};
///
/// let mut decoder = StreamDecoder::new(Framing::Ndjson);
/// assert!(decoder.decode(b"{\"response\":").is_empty());
///
/// let values = decoder.decode(b"\"hello\"}\n");
/// assert_eq!(values.len(), 1);
/// assert_eq!(values[0]["response"], "hello");
/// ```
#[derive(Debug)]
pub struct StreamDecoder {
    framing: Framing,
    buffer: Vec<u8>,
}

impl StreamDecoder {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: Vec::new(),
        }
    }

    /// Feed a raw chunk and return every JSON value completed by it.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);

        let mut values = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(val) = self.parse_line(&String::from_utf8_lossy(&line)) {
                values.push(val);
            }
        }
        values
    }

    /// Parse whatever is left once the stream has ended.
    pub fn flush(&mut self) -> Vec<Value> {
        let remaining = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        remaining
            .lines()
            .filter_map(|line| self.parse_line(line))
            .collect()
    }

    fn parse_line(&self, line: &str) -> Option<Value> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let payload = match self.framing {
            Framing::Ndjson => line,
            Framing::Sse => {
                let data = line
                    .strip_prefix("data:")
                    .map(str::trim)?;
                if data == "[DONE]" {
                    return None;
                }
                data
            }
        };
        match serde_json::from_str::<Value>(payload) {
            Ok(val) => Some(val),
            Err(e) => {
                tracing::debug!(error = %e, line = payload, "skipping undecodable stream line");
                None
            }
        }
    }
}
