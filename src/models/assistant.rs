use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assistant {
    pub id: i64,
    pub open_ai_assistant_id: String,
    pub name: String,
    pub system_prompt: String,
    pub created_at: DateTime<Utc>,
}
