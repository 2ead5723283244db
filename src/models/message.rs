#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(eyre::eyre!("unknown role: {}", other)),
        }
    }
}

/// A durable message. `id` is assigned by the store and always positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub thread_id: i64,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub openai_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A message that has not been inserted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    thread_id: i64,
    role: Role,
    content: String,
    upstream_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl NewMessage {
    pub fn new(thread_id: i64, role: Role, content: impl Into<String>) -> Self {
        Self {
            thread_id,
            role,
            content: content.into(),
            upstream_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn user(thread_id: i64, content: impl Into<String>) -> Self {
        Self::new(thread_id, Role::User, content)
    }

    pub fn assistant(thread_id: i64, content: impl Into<String>) -> Self {
        Self::new(thread_id, Role::Assistant, content)
    }

    pub fn with_upstream_id(mut self, upstream_id: Option<String>) -> Self {
        self.upstream_id = upstream_id;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn thread_id(&self) -> i64 {
        self.thread_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn upstream_id(&self) -> Option<&str> {
        self.upstream_id.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
