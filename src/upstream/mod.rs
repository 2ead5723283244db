pub mod openai;

pub use openai::OpenAI;

use std::sync::Arc;

use async_trait::async_trait;
use eyre::{Context, Result};
#[cfg(test)]
use mockall::automock;

use crate::{
    config::UpstreamConfig,
    models::{RunStream, UpstreamMessage},
};

/// The remote assistant provider. Runs are consumed as a [`RunStream`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Upstream {
    fn name(&self) -> &str;

    /// Create a remote assistant and return its id.
    async fn create_assistant(&self, name: &str, instructions: &str, model: &str)
    -> Result<String>;
    async fn update_assistant(
        &self,
        assistant_id: &str,
        name: Option<String>,
        instructions: Option<String>,
    ) -> Result<()>;

    /// Create a remote thread and return its id.
    async fn create_thread(&self) -> Result<String>;

    /// Append a user turn to the remote thread and return the upstream
    /// message id.
    async fn create_message(&self, thread_id: &str, content: &str) -> Result<String>;

    /// Start a run of `assistant_id` over the remote thread.
    async fn stream_run(&self, assistant_id: &str, thread_id: &str) -> Result<RunStream>;

    /// Every message of the remote thread, oldest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<UpstreamMessage>>;
}

pub type ArcUpstream = Arc<dyn Upstream + Send + Sync>;

pub fn new_upstream(config: &UpstreamConfig) -> Result<ArcUpstream> {
    let mut openai = OpenAI::default().with_endpoint(&config.endpoint);
    if let Some(api_key) = config.api_key() {
        openai = openai.with_api_key(&api_key);
    } else {
        log::warn!("No upstream API key configured");
    }
    if let Some(timeout) = config.timeout() {
        openai = openai.with_timeout(timeout);
    }
    openai.init().wrap_err("initializing OpenAI")?;
    Ok(Arc::new(openai))
}
