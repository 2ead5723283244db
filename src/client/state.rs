#[cfg(test)]
#[path = "state_test.rs"]
mod tests;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{ClientError, StreamEvent};
use crate::models::{Message, Role};

/// Identity of a transcript entry on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryId {
    /// Stored by the server.
    Durable(i64),
    /// Optimistic user turn not yet confirmed by a reload.
    Pending(Uuid),
    /// The assistant reply being streamed. At most one per transcript.
    InProgress,
    /// Partial reply of an earlier failed run, shown until the next reload.
    Stale(Uuid),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: EntryId,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    pub fn is_durable(&self) -> bool {
        matches!(self.id, EntryId::Durable(_))
    }
}

impl From<Message> for Entry {
    fn from(message: Message) -> Self {
        Self {
            id: EntryId::Durable(message.id),
            role: message.role,
            content: message.content,
            created_at: message.created_at,
        }
    }
}

/// What the caller should do after a stream event was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Continue,
    /// The run is over; reload the durable transcript.
    Reload,
    Failed(String),
}

/// Transcript of one conversation plus the state of its in-flight send.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    thread_id: i64,
    entries: Vec<Entry>,
    buffer: String,
    streaming: bool,
    error: Option<String>,
}

impl ConversationState {
    pub fn new(thread_id: i64) -> Self {
        Self {
            thread_id,
            ..Default::default()
        }
    }

    pub fn thread_id(&self) -> i64 {
        self.thread_id
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn in_progress(&self) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == EntryId::InProgress)
    }

    /// Start a send: append the optimistic user turn. Only one send may be
    /// in flight per conversation. A reply left over from a failed run is
    /// detached so the new run streams into an entry of its own.
    pub fn begin_send(&mut self, content: &str) -> Result<Uuid, ClientError> {
        if self.streaming {
            return Err(ClientError::Busy);
        }

        for entry in self.entries.iter_mut() {
            if entry.id == EntryId::InProgress {
                entry.id = EntryId::Stale(Uuid::new_v4());
            }
        }

        let id = Uuid::new_v4();
        self.entries.push(Entry {
            id: EntryId::Pending(id),
            role: Role::User,
            content: content.to_string(),
            created_at: Utc::now(),
        });
        self.buffer.clear();
        self.error = None;
        self.streaming = true;
        Ok(id)
    }

    pub fn apply(&mut self, event: StreamEvent) -> Applied {
        match event {
            StreamEvent::Token(text) => {
                self.buffer.push_str(&text);
                self.upsert_in_progress();
                Applied::Continue
            }
            StreamEvent::Completed => Applied::Continue,
            StreamEvent::Done => {
                self.entries.retain(|e| e.id != EntryId::InProgress);
                Applied::Reload
            }
            StreamEvent::Error(message) => {
                self.error = Some(message.clone());
                Applied::Failed(message)
            }
        }
    }

    /// Install the durable transcript. Optimistic, in-progress and stale
    /// entries are dropped.
    pub fn replace_transcript(&mut self, messages: Vec<Message>) {
        self.entries = messages.into_iter().map(Entry::from).collect();
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn finish(&mut self) {
        self.streaming = false;
    }

    fn upsert_in_progress(&mut self) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.id == EntryId::InProgress)
        {
            Some(entry) => entry.content.clone_from(&self.buffer),
            None => self.entries.push(Entry {
                id: EntryId::InProgress,
                role: Role::Assistant,
                content: self.buffer.clone(),
                created_at: Utc::now(),
            }),
        }
    }
}
