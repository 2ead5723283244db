pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
#[cfg(test)]
use mockall::automock;

use crate::{
    config::{StorageConfig, resolve_path},
    models::{Assistant, Message, NewMessage, Thread},
};
use sqlite::Sqlite;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Storage {
    async fn list_assistants(&self) -> Result<Vec<Assistant>>;
    async fn get_assistant(&self, id: i64) -> Result<Option<Assistant>>;
    async fn create_assistant(
        &self,
        remote_id: &str,
        name: &str,
        system_prompt: &str,
    ) -> Result<Assistant>;
    async fn update_assistant(
        &self,
        id: i64,
        name: Option<String>,
        system_prompt: Option<String>,
    ) -> Result<Option<Assistant>>;

    /// Threads of an assistant, newest first.
    async fn list_threads(&self, assistant_id: i64) -> Result<Vec<Thread>>;
    async fn get_thread(&self, id: i64) -> Result<Option<Thread>>;
    async fn create_thread(&self, remote_id: &str, title: &str, assistant_id: i64)
    -> Result<Thread>;

    /// Insert a message and return its store-assigned id.
    async fn insert_message(&self, message: NewMessage) -> Result<i64>;
    /// Messages of a thread ordered by creation time.
    async fn get_messages(&self, thread_id: i64) -> Result<Vec<Message>>;
    /// Atomically drop every message of the thread and insert `messages`.
    /// Returns the number of inserted rows.
    async fn replace_messages(&self, thread_id: i64, messages: Vec<NewMessage>) -> Result<usize>;
}

pub type ArcStorage = Arc<dyn Storage + Send + Sync>;

pub async fn new_storage(config: &StorageConfig) -> Result<ArcStorage> {
    let storage = match config {
        StorageConfig::Sqlite(sqlite_config) => {
            let path = match sqlite_config.path() {
                Some(path) => Some(resolve_path(path)?),
                None => {
                    log::warn!("No sqlite path configured, messages are kept in memory");
                    None
                }
            };
            Arc::new(Sqlite::new(path.as_deref()).await?)
        }
    };
    Ok(storage)
}
