#[cfg(test)]
#[path = "api_test.rs"]
mod tests;

use std::time;

use eyre::Context;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;

use super::{Applied, ClientError, ConversationState, StreamEvent};
use crate::config::{ClientConfig, user_agent};
use crate::frame::FrameReader;
use crate::models::{Assistant, Message, SyncResponse, Thread};

type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for the relay server.
pub struct ChatClient {
    endpoint: String,
    timeout: Option<time::Duration>,
}

impl ChatClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        let mut client = Self::new(&config.endpoint);
        client.timeout = config.timeout();
        client
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn assistants(&self) -> ClientResult<Vec<Assistant>> {
        self.get_json("/api/assistant").await
    }

    pub async fn threads(&self, assistant_id: i64) -> ClientResult<Vec<Thread>> {
        self.get_json(&format!("/api/threads/{}", assistant_id)).await
    }

    pub async fn create_thread(&self, assistant_id: i64, title: &str) -> ClientResult<Thread> {
        let res = self
            .request(reqwest::Method::POST, &format!("/api/thread/{}", assistant_id))
            .json(&json!({ "title": title }))
            .send()
            .await
            .wrap_err("creating thread")?;
        parse_json(res).await
    }

    pub async fn list_messages(&self, thread_id: i64) -> ClientResult<Vec<Message>> {
        self.get_json(&format!("/api/messages/{}", thread_id)).await
    }

    pub async fn sync(&self, thread_id: i64) -> ClientResult<SyncResponse> {
        let res = self
            .request(reqwest::Method::POST, &format!("/api/sync/{}", thread_id))
            .send()
            .await
            .wrap_err("syncing thread")?;
        parse_json(res).await
    }

    /// Load the durable transcript of the conversation into `state`.
    pub async fn reload(&self, state: &mut ConversationState) -> ClientResult<()> {
        let messages = self.list_messages(state.thread_id()).await?;
        state.replace_transcript(messages);
        Ok(())
    }

    /// Send one user turn and follow the reply stream until it ends.
    /// `on_event` sees every recognized frame before it is applied.
    pub async fn send<F>(
        &self,
        assistant_id: i64,
        state: &mut ConversationState,
        content: &str,
        mut on_event: F,
    ) -> ClientResult<()>
    where
        F: FnMut(&StreamEvent),
    {
        state.begin_send(content)?;
        let result = self
            .stream_reply(assistant_id, state, content, &mut on_event)
            .await;
        state.finish();

        if let Err(err) = &result {
            match err {
                ClientError::Run(message) => state.set_error(message.clone()),
                err => state.set_error(err.to_string()),
            }
        }
        result
    }

    async fn stream_reply<F>(
        &self,
        assistant_id: i64,
        state: &mut ConversationState,
        content: &str,
        on_event: &mut F,
    ) -> ClientResult<()>
    where
        F: FnMut(&StreamEvent),
    {
        // The reply stream is not bounded by the request timeout.
        let res = self
            .base_request(reqwest::Method::POST, &format!("/api/chat/{}", assistant_id))
            .json(&json!({ "threadId": state.thread_id(), "content": content }))
            .send()
            .await
            .wrap_err("sending chat request")?;
        let res = check_response(res).await?;

        let mut reader = FrameReader::new(res.bytes_stream());
        while let Some(frame) = reader.next_frame().await? {
            let Some(event) = StreamEvent::from_frame(frame) else {
                continue;
            };
            on_event(&event);
            match state.apply(event) {
                Applied::Continue => {}
                Applied::Reload => return self.reload(state).await,
                Applied::Failed(message) => return Err(ClientError::Run(message)),
            }
        }

        log::warn!(
            "chat stream of thread {} closed without a terminal frame",
            state.thread_id()
        );
        Err(ClientError::Interrupted)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let res = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .wrap_err(format!("requesting {}", path))?;
        parse_json(res).await
    }

    fn base_request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        reqwest::Client::new()
            .request(method, format!("{}{}", self.endpoint, path))
            .header("User-Agent", user_agent())
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.base_request(method, path);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        req
    }
}

async fn check_response(res: reqwest::Response) -> ClientResult<reqwest::Response> {
    if res.status().is_success() {
        return Ok(res);
    }

    let status = res.status().as_u16();
    let body = res.text().await.wrap_err("reading error response")?;
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(body) => body.error,
        Err(_) if !body.is_empty() => body,
        Err(_) => format!("HTTP {}", status),
    };
    Err(ClientError::Api { status, message })
}

async fn parse_json<T: DeserializeOwned>(res: reqwest::Response) -> ClientResult<T> {
    let res = check_response(res).await?;
    Ok(res.json::<T>().await.wrap_err("parsing response")?)
}
