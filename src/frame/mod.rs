//! Event-stream framing shared by the relay, the client and the upstream
//! provider.
//!
//! A frame is written as
//!
//! ```text
//! event: <name>
//! data: <line 1>
//! data: <line 2>
//!
//! ```
//!
//! and frames are delimited by a blank line.

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;

pub mod reader;

pub use reader::FrameReader;

pub const EVENT_TOKEN: &str = "token";
pub const EVENT_MESSAGE_COMPLETED: &str = "message_completed";
pub const EVENT_DONE: &str = "done";
pub const EVENT_ERROR: &str = "error";

/// Event name used when a frame carries no `event:` line.
pub const DEFAULT_EVENT: &str = "message";

pub const MESSAGE_COMPLETED_PAYLOAD: &str = "done";
pub const DONE_PAYLOAD: &str = "[DONE]";

const DELIMITER: &[u8] = b"\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    event: String,
    data: String,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    pub fn token(text: impl Into<String>) -> Self {
        Self::new(EVENT_TOKEN, text)
    }

    pub fn message_completed() -> Self {
        Self::new(EVENT_MESSAGE_COMPLETED, MESSAGE_COMPLETED_PAYLOAD)
    }

    pub fn done() -> Self {
        Self::new(EVENT_DONE, DONE_PAYLOAD)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EVENT_ERROR, message)
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn into_parts(self) -> (String, String) {
        (self.event, self.data)
    }

    pub fn is_terminal(&self) -> bool {
        self.event == EVENT_DONE || self.event == EVENT_ERROR
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.event.len() + self.data.len() + 16);
        out.push_str("event: ");
        out.push_str(&self.event);
        out.push('\n');
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }

    /// Parse a single frame body (without the trailing blank line).
    /// Returns `None` for frames that carry nothing but whitespace or
    /// comments.
    pub fn parse(raw: &str) -> Option<Frame> {
        if raw.trim().is_empty() {
            return None;
        }

        let mut event: Option<&str> = None;
        let mut data: Option<String> = None;
        let mut seen_field = false;

        for line in raw.split('\n') {
            if line.starts_with(':') {
                continue;
            }
            if let Some(value) = field_value(line, "event") {
                event = Some(value);
                seen_field = true;
            } else if let Some(value) = field_value(line, "data") {
                match data.as_mut() {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => data = Some(value.to_string()),
                }
                seen_field = true;
            }
        }

        if !seen_field {
            return None;
        }

        Some(Frame {
            event: event.unwrap_or(DEFAULT_EVENT).to_string(),
            data: data.unwrap_or_default(),
        })
    }
}

fn field_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Reassembles frames from arbitrarily split byte chunks.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more bytes and return every frame completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        // A delimiter may straddle the previous chunk boundary.
        let mut search_from = self.buf.len().saturating_sub(DELIMITER.len() - 1);
        self.buf.extend_from_slice(chunk);

        let mut frames = vec![];
        let mut start = 0;
        while let Some(pos) = find(&self.buf[search_from..], DELIMITER) {
            let end = search_from + pos;
            let raw = String::from_utf8_lossy(&self.buf[start..end]);
            if let Some(frame) = Frame::parse(&raw) {
                frames.push(frame);
            }
            start = end + DELIMITER.len();
            search_from = start;
        }
        self.buf.drain(..start);
        frames
    }

    /// Bytes received that do not form a complete frame yet.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
