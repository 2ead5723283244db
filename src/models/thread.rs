use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation. `openai_threadid` is the remote thread runs are
/// started against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: i64,
    pub openai_threadid: String,
    pub thread_title: String,
    pub assistant_id: i64,
    pub created_at: DateTime<Utc>,
}

impl Thread {
    pub fn belongs_to(&self, assistant_id: i64) -> bool {
        self.assistant_id == assistant_id
    }
}
