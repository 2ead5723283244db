use std::pin::Pin;

use chrono::{DateTime, Utc};
use eyre::Result;
use futures::Stream;

use super::Role;

/// One notification from an upstream generation run.
///
/// Upstreams are not required to emit a well-formed sequence: a
/// `MessageCompleted` may be missing, may follow `End`, and `Error` may
/// arrive at any point.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// The upstream started a new text message.
    TextCreated(Option<String>),
    TextDelta(String),
    MessageCompleted(Option<String>),
    End,
    Error(String),
}

pub type RunStream = Pin<Box<dyn Stream<Item = Result<RunEvent>> + Send>>;

/// A message as recorded by the upstream for a remote thread.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
