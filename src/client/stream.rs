use crate::frame::{EVENT_DONE, EVENT_ERROR, EVENT_MESSAGE_COMPLETED, EVENT_TOKEN, Frame};

/// A frame of the chat stream as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Token(String),
    Completed,
    Done,
    Error(String),
}

impl StreamEvent {
    /// Unknown event names map to `None` and are skipped by the reader.
    pub fn from_frame(frame: Frame) -> Option<Self> {
        let (event, data) = frame.into_parts();
        match event.as_str() {
            EVENT_TOKEN => Some(StreamEvent::Token(data)),
            EVENT_MESSAGE_COMPLETED => Some(StreamEvent::Completed),
            EVENT_DONE => Some(StreamEvent::Done),
            EVENT_ERROR => Some(StreamEvent::Error(data)),
            _ => None,
        }
    }
}
