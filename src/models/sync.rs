use serde::{Deserialize, Serialize};

/// Result of rebuilding a thread's transcript from the upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncResponse {
    pub synced: usize,
    pub total: usize,
    pub deleted: bool,
}
