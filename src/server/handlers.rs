use std::convert::Infallible;

use axum::{
    Json,
    body::Body,
    extract::{Path, State, rejection::JsonRejection},
    http::header,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{AppState, error::ApiError};
use crate::models::{Assistant, Message, NewMessage, SyncResponse, Thread};
use crate::relay::Relay;

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct CreateAssistantRequest {
    pub name: Option<String>,
    pub instructions: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAssistantRequest {
    pub name: Option<String>,
    pub instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateThreadRequest {
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub thread_id: Option<i64>,
    pub content: Option<String>,
}

fn parse_id(raw: &str, name: &str) -> ApiResult<i64> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::bad_request(format!("Invalid {}", name)))
}

/// Treat blank strings as missing.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

pub async fn list_assistants(State(state): State<AppState>) -> ApiResult<Json<Vec<Assistant>>> {
    Ok(Json(state.storage.list_assistants().await?))
}

pub async fn get_assistant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Assistant>> {
    let id = parse_id(&id, "id")?;
    let assistant = state
        .storage
        .get_assistant(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Assistant"))?;
    Ok(Json(assistant))
}

pub async fn create_assistant(
    State(state): State<AppState>,
    payload: Result<Json<CreateAssistantRequest>, JsonRejection>,
) -> ApiResult<Json<Assistant>> {
    let Json(req) = payload?;
    let (Some(name), Some(instructions)) = (non_blank(req.name), non_blank(req.instructions))
    else {
        return Err(ApiError::bad_request("name and instructions are required"));
    };
    let model = non_blank(req.model).unwrap_or_else(|| state.default_model.clone());

    let remote_id = state
        .upstream
        .create_assistant(&name, &instructions, &model)
        .await
        .map_err(ApiError::upstream)?;
    let assistant = state
        .storage
        .create_assistant(&remote_id, &name, &instructions)
        .await?;
    log::info!("created assistant {} ({})", assistant.id, remote_id);
    Ok(Json(assistant))
}

pub async fn update_assistant(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateAssistantRequest>, JsonRejection>,
) -> ApiResult<Json<Assistant>> {
    let id = parse_id(&id, "id")?;
    let Json(req) = payload?;
    let name = non_blank(req.name);
    let instructions = non_blank(req.instructions);
    if name.is_none() && instructions.is_none() {
        return Err(ApiError::bad_request("Nothing to update"));
    }

    let existing = state
        .storage
        .get_assistant(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Assistant"))?;
    state
        .upstream
        .update_assistant(
            &existing.open_ai_assistant_id,
            name.clone(),
            instructions.clone(),
        )
        .await
        .map_err(ApiError::upstream)?;

    let updated = state
        .storage
        .update_assistant(id, name, instructions)
        .await?
        .ok_or_else(|| ApiError::not_found("Assistant"))?;
    Ok(Json(updated))
}

pub async fn create_thread(
    State(state): State<AppState>,
    Path(assistant_id): Path<String>,
    payload: Result<Json<CreateThreadRequest>, JsonRejection>,
) -> ApiResult<Json<Thread>> {
    let assistant_id = parse_id(&assistant_id, "assistantId")?;
    let assistant = state
        .storage
        .get_assistant(assistant_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Assistant"))?;
    let Json(req) = payload?;
    let Some(title) = non_blank(req.title) else {
        return Err(ApiError::bad_request("title is required"));
    };

    let remote_id = state
        .upstream
        .create_thread()
        .await
        .map_err(ApiError::upstream)?;
    let thread = state
        .storage
        .create_thread(&remote_id, title.trim(), assistant.id)
        .await?;
    Ok(Json(thread))
}

pub async fn list_threads(
    State(state): State<AppState>,
    Path(assistant_id): Path<String>,
) -> ApiResult<Json<Vec<Thread>>> {
    let assistant_id = parse_id(&assistant_id, "assistantId")?;
    Ok(Json(state.storage.list_threads(assistant_id).await?))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<Vec<Message>>> {
    let thread_id = parse_id(&thread_id, "threadId")?;
    Ok(Json(state.storage.get_messages(thread_id).await?))
}

/// Rebuild the local transcript of a thread from the upstream's record.
pub async fn sync_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<SyncResponse>> {
    let thread_id = parse_id(&thread_id, "threadId")?;
    let thread = state
        .storage
        .get_thread(thread_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Thread"))?;

    let remote = state
        .upstream
        .list_messages(&thread.openai_threadid)
        .await
        .map_err(ApiError::upstream)?;
    let total = remote.len();
    let messages = remote
        .into_iter()
        .map(|m| {
            NewMessage::new(thread.id, m.role, m.content)
                .with_upstream_id(Some(m.id))
                .with_created_at(m.created_at)
        })
        .collect();

    let synced = state.storage.replace_messages(thread.id, messages).await?;
    log::info!("synced {}/{} messages of thread {}", synced, total, thread.id);
    Ok(Json(SyncResponse {
        synced,
        total,
        deleted: true,
    }))
}

/// Persist the user turn, then stream the assistant reply as frames.
pub async fn chat(
    State(state): State<AppState>,
    Path(assistant_id): Path<String>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let assistant_id = parse_id(&assistant_id, "assistantId")?;
    let Json(req) = payload?;
    let content = req.content.filter(|c| !c.is_empty());
    let (Some(thread_id), Some(content)) = (req.thread_id, content) else {
        return Err(ApiError::bad_request("threadId and content are required"));
    };

    let assistant = state
        .storage
        .get_assistant(assistant_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Assistant"))?;
    let thread = state
        .storage
        .get_thread(thread_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Thread"))?;
    if !thread.belongs_to(assistant.id) {
        return Err(ApiError::bad_request("Thread does not belong to assistant"));
    }

    let remote_id = state
        .upstream
        .create_message(&thread.openai_threadid, &content)
        .await
        .map_err(ApiError::upstream)?;
    state
        .storage
        .insert_message(NewMessage::user(thread.id, content).with_upstream_id(Some(remote_id)))
        .await?;

    let (tx, rx) = mpsc::channel(state.frame_buffer.max(1));
    let storage = state.storage.clone();
    let upstream = state.upstream.clone();
    tokio::spawn(async move {
        let run = upstream
            .stream_run(&assistant.open_ai_assistant_id, &thread.openai_threadid)
            .await;
        let outcome = Relay::new(storage, thread.id, tx).run(run).await;
        log::info!(
            "run of thread {} finished: {:?}, saved {:?}, {} frames",
            thread.id,
            outcome.state,
            outcome.message_id,
            outcome.frames
        );
    });

    let body = ReceiverStream::new(rx).map(|frame| Ok::<_, Infallible>(frame.encode()));
    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response())
}
