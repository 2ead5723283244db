#[cfg(test)]
#[path = "openai_test.rs"]
mod tests;

use std::{fmt::Display, time};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::{Context, Result, bail};
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::config::{constants::MESSAGE_PAGE_SIZE, user_agent};
use crate::frame::{Frame, FrameReader};
use crate::models::{Role, RunEvent, RunStream, UpstreamMessage};
use crate::upstream::Upstream;

const BETA_HEADER: &str = "OpenAI-Beta";
const BETA_ASSISTANTS: &str = "assistants=v2";

pub struct OpenAI {
    alias: String,
    endpoint: String,
    api_key: Option<String>,
    timeout: Option<time::Duration>,
}

#[async_trait]
impl Upstream for OpenAI {
    fn name(&self) -> &str {
        &self.alias
    }

    async fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
        model: &str,
    ) -> Result<String> {
        let req = AssistantRequest {
            name: Some(name.to_string()),
            instructions: Some(instructions.to_string()),
            model: Some(model.to_string()),
        };
        let res: ObjectResponse = self
            .post_json("/v1/assistants", &req)
            .await
            .wrap_err("creating assistant")?;
        Ok(res.id)
    }

    async fn update_assistant(
        &self,
        assistant_id: &str,
        name: Option<String>,
        instructions: Option<String>,
    ) -> Result<()> {
        let req = AssistantRequest {
            name,
            instructions,
            model: None,
        };
        let _: ObjectResponse = self
            .post_json(&format!("/v1/assistants/{}", assistant_id), &req)
            .await
            .wrap_err(format!("updating assistant {}", assistant_id))?;
        Ok(())
    }

    async fn create_thread(&self) -> Result<String> {
        let res: ObjectResponse = self
            .post_json("/v1/threads", &serde_json::json!({}))
            .await
            .wrap_err("creating thread")?;
        Ok(res.id)
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<String> {
        let req = MessageRequest {
            role: Role::User.to_string(),
            content: content.to_string(),
        };
        let res: ObjectResponse = self
            .post_json(&format!("/v1/threads/{}/messages", thread_id), &req)
            .await
            .wrap_err(format!("creating message in thread {}", thread_id))?;
        Ok(res.id)
    }

    async fn stream_run(&self, assistant_id: &str, thread_id: &str) -> Result<RunStream> {
        let req = RunRequest {
            assistant_id: assistant_id.to_string(),
            stream: true,
        };

        log::trace!("Starting run: {:?}", req);

        let res = self
            .run_request(thread_id, &req)
            .send()
            .await
            .wrap_err("sending run request")?;
        let res = check_response(res).await?;

        let events = FrameReader::new(res.bytes_stream())
            .into_stream()
            .flat_map(|frame| {
                let events = match frame {
                    Ok(frame) => {
                        log::trace!("run event: {} {}", frame.event(), frame.data());
                        run_events(&frame).unwrap_or_else(|err| vec![Err(err)])
                    }
                    Err(err) => vec![Err(err)],
                };
                stream::iter(events)
            });
        Ok(Box::pin(events))
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<UpstreamMessage>> {
        let mut messages = vec![];
        let mut after: Option<String> = None;
        let limit = MESSAGE_PAGE_SIZE.to_string();

        loop {
            let mut query = vec![("order", "asc"), ("limit", limit.as_str())];
            if let Some(after) = after.as_deref() {
                query.push(("after", after));
            }

            let res = self
                .request(
                    reqwest::Method::GET,
                    &format!("/v1/threads/{}/messages", thread_id),
                )
                .query(&query)
                .send()
                .await
                .wrap_err("listing messages")?;
            let page = check_response(res)
                .await?
                .json::<MessageListResponse>()
                .await
                .wrap_err("parsing message list response")?;

            for message in page.data {
                messages.push(message.try_into()?);
            }

            match page.last_id {
                Some(last_id) if page.has_more => after = Some(last_id),
                _ => break,
            }
        }

        Ok(messages)
    }
}

impl OpenAI {
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn init(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            bail!("endpoint is not set");
        }
        reqwest::Url::parse(&self.endpoint)
            .wrap_err(format!("parsing endpoint {}", self.endpoint))?;
        Ok(())
    }

    fn base_request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = reqwest::Client::new()
            .request(method, format!("{}{}", self.endpoint, path))
            .header("User-Agent", user_agent())
            .header(BETA_HEADER, BETA_ASSISTANTS);

        match &self.api_key {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = self.base_request(method, path);
        match self.timeout {
            Some(timeout) => req.timeout(timeout),
            None => req,
        }
    }

    /// The run stream lasts as long as the generation, so the total request
    /// timeout does not apply to it.
    fn run_request(&self, thread_id: &str, req: &RunRequest) -> reqwest::RequestBuilder {
        self.base_request(reqwest::Method::POST, &format!("/v1/threads/{}/runs", thread_id))
            .header("Content-Type", "application/json")
            .json(req)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let res = self
            .request(reqwest::Method::POST, path)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .wrap_err(format!("sending request to {}", path))?;
        let res = check_response(res).await?;
        res.json::<T>()
            .await
            .wrap_err(format!("parsing response from {}", path))
    }
}

impl Default for OpenAI {
    fn default() -> Self {
        Self {
            alias: "OpenAI".to_string(),
            endpoint: "https://api.openai.com".to_string(),
            api_key: None,
            timeout: None,
        }
    }
}

async fn check_response(res: reqwest::Response) -> Result<reqwest::Response> {
    if res.status().is_success() {
        return Ok(res);
    }

    let http_code = res.status().as_u16();
    let body = res.text().await.wrap_err("reading error response")?;
    log::error!("Error response: {}", body);
    let mut err = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(resp) => resp.error,
        Err(_) => OpenAIError {
            message: body,
            ..Default::default()
        },
    };
    err.http_code = http_code;
    Err(err.into())
}

/// Translate one frame of the Assistants run stream into run events.
fn run_events(frame: &Frame) -> Result<Vec<Result<RunEvent>>> {
    let events = match frame.event() {
        "thread.message.created" => {
            let msg: ObjectResponse = parse_data(frame)?;
            vec![RunEvent::TextCreated(Some(msg.id))]
        }
        "thread.message.delta" => {
            let delta: MessageDeltaEvent = parse_data(frame)?;
            delta
                .delta
                .content
                .into_iter()
                .filter_map(|part| part.text.and_then(|text| text.value))
                .map(RunEvent::TextDelta)
                .collect()
        }
        "thread.message.completed" => {
            let msg: ObjectResponse = parse_data(frame)?;
            vec![RunEvent::MessageCompleted(Some(msg.id))]
        }
        "thread.run.failed" => {
            let run: RunObject = parse_data(frame)?;
            let message = run
                .last_error
                .map(|err| err.message)
                .unwrap_or_else(|| "run failed".to_string());
            vec![RunEvent::Error(message)]
        }
        "thread.run.cancelled" => vec![RunEvent::Error("run cancelled".to_string())],
        "thread.run.expired" => vec![RunEvent::Error("run expired".to_string())],
        "error" => vec![RunEvent::Error(error_message(frame.data()))],
        "done" => vec![RunEvent::End],
        _ => vec![],
    };
    Ok(events.into_iter().map(Ok).collect())
}

fn parse_data<T: DeserializeOwned>(frame: &Frame) -> Result<T> {
    serde_json::from_str(frame.data()).wrap_err(format!(
        "parsing {} event: {}",
        frame.event(),
        frame.data()
    ))
}

fn error_message(data: &str) -> String {
    if let Ok(resp) = serde_json::from_str::<ErrorResponse>(data) {
        return resp.error.message;
    }
    if let Ok(err) = serde_json::from_str::<ErrorMessage>(data) {
        return err.message;
    }
    if data.is_empty() {
        return "stream error".to_string();
    }
    data.to_string()
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct AssistantRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct MessageRequest {
    role: String,
    content: String,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct RunRequest {
    assistant_id: String,
    stream: bool,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct ObjectResponse {
    id: String,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct MessageDeltaEvent {
    delta: MessageDelta,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct MessageDelta {
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    part_type: String,
    #[serde(default)]
    text: Option<TextContent>,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct TextContent {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct RunObject {
    #[serde(default)]
    last_error: Option<ErrorMessage>,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct ErrorMessage {
    message: String,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct MessageListResponse {
    data: Vec<MessageObject>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    last_id: Option<String>,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct MessageObject {
    id: String,
    role: String,
    created_at: i64,
    #[serde(default)]
    content: Vec<ContentPart>,
}

impl TryFrom<MessageObject> for UpstreamMessage {
    type Error = eyre::Report;

    fn try_from(msg: MessageObject) -> Result<Self> {
        let role = msg.role.parse::<Role>()?;
        let created_at = DateTime::<Utc>::from_timestamp(msg.created_at, 0)
            .ok_or_else(|| eyre::eyre!("invalid created_at: {}", msg.created_at))?;
        // Only the first block is kept, and only when it is text.
        let content = msg
            .content
            .into_iter()
            .next()
            .filter(|part| part.part_type == "text")
            .and_then(|part| part.text)
            .and_then(|text| text.value)
            .unwrap_or_default();
        Ok(UpstreamMessage {
            id: msg.id,
            role,
            content,
            created_at,
        })
    }
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: OpenAIError,
}

#[derive(Default, Error, Debug, Serialize, Deserialize)]
pub struct OpenAIError {
    #[serde(skip)]
    pub http_code: u16,
    pub message: String,
    #[serde(rename = "type", default)]
    pub err_type: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl Display for OpenAIError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OpenAI error ({}): {}", self.http_code, self.message)
    }
}
