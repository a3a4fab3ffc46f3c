//! Server-sent event decoding for streamed completions.
//!
//! The body arrives as arbitrary byte chunks. [`LineBuffer`] reassembles them
//! into lines, and [`decode_line`] turns each line into a [`StreamEvent`].

use serde_json::Value;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Meaning of one SSE line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Generated text to hand to the caller
    Fragment(String),
    /// `[DONE]` or a finish reason: the stream is complete
    Done,
    /// Payload was not valid JSON
    Malformed(String),
    /// Blank lines, comments, keep-alives, role-only deltas and the like
    Skip,
}

/// Splits a chunked byte stream into complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line it finishes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(to_line(&line[..pos]));
        }
        lines
    }

    /// Whatever is left once the body ends without a trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(to_line(&rest))
    }
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Decode one SSE line.
pub fn decode_line(line: &str) -> StreamEvent {
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return StreamEvent::Skip;
    };

    let data = data.trim();
    if data == DONE_SENTINEL {
        return StreamEvent::Done;
    }
    if data.is_empty() {
        return StreamEvent::Skip;
    }

    match serde_json::from_str::<Value>(data) {
        Ok(payload) => decode_payload(&payload),
        Err(e) => StreamEvent::Malformed(e.to_string()),
    }
}

fn decode_payload(payload: &Value) -> StreamEvent {
    let Some(choice) = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
    else {
        return StreamEvent::Skip;
    };

    // A delta carrying a content key is never treated as the end, even when it
    // also has a finish reason.
    if let Some(content) = choice.get("delta").and_then(|delta| delta.get("content")) {
        return match content.as_str() {
            Some(text) if !text.is_empty() => StreamEvent::Fragment(text.to_string()),
            _ => StreamEvent::Skip,
        };
    }

    if is_truthy(choice.get("finish_reason")) {
        StreamEvent::Done
    } else {
        StreamEvent::Skip
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}
