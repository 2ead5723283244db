use futures::StreamExt;
use mockito::Matcher;

use super::*;

fn setup_backend(url: String) -> OpenAI {
    OpenAI::default()
        .with_endpoint(&url)
        .with_api_key("test_token")
}

fn sse(events: &[(&str, &str)]) -> String {
    events
        .iter()
        .map(|(event, data)| Frame::new(*event, *data).encode())
        .collect()
}

async fn collect_events(stream: RunStream) -> Vec<RunEvent> {
    stream
        .map(|event| event.expect("run event"))
        .collect::<Vec<_>>()
        .await
}

#[tokio::test]
async fn test_create_thread() {
    let mut server = mockito::Server::new_async().await;
    let handler = server
        .mock("POST", "/v1/threads")
        .match_header("Authorization", "Bearer test_token")
        .match_header("OpenAI-Beta", "assistants=v2")
        .with_status(200)
        .with_body(r#"{"id":"thread_abc","object":"thread"}"#)
        .expect(1)
        .create_async()
        .await;

    let backend = setup_backend(server.url());
    let id = backend.create_thread().await.expect("create thread");
    assert_eq!(id, "thread_abc");
    handler.assert_async().await;
}

#[tokio::test]
async fn test_create_message_posts_user_turn() {
    let mut server = mockito::Server::new_async().await;
    let handler = server
        .mock("POST", "/v1/threads/thread_abc/messages")
        .match_body(Matcher::Json(serde_json::json!({
            "role": "user",
            "content": "Hello there",
        })))
        .with_status(200)
        .with_body(r#"{"id":"msg_user_1"}"#)
        .create_async()
        .await;

    let backend = setup_backend(server.url());
    let id = backend
        .create_message("thread_abc", "Hello there")
        .await
        .expect("create message");
    assert_eq!(id, "msg_user_1");
    handler.assert_async().await;
}

#[tokio::test]
async fn test_update_assistant_skips_missing_fields() {
    let mut server = mockito::Server::new_async().await;
    let handler = server
        .mock("POST", "/v1/assistants/asst_1")
        .match_body(Matcher::Json(serde_json::json!({ "name": "Renamed" })))
        .with_status(200)
        .with_body(r#"{"id":"asst_1"}"#)
        .create_async()
        .await;

    let backend = setup_backend(server.url());
    backend
        .update_assistant("asst_1", Some("Renamed".to_string()), None)
        .await
        .expect("update assistant");
    handler.assert_async().await;
}

#[tokio::test]
async fn test_error_response() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/assistants")
        .with_status(401)
        .with_body(r#"{"error":{"message":"Incorrect API key","type":"invalid_request_error","param":null,"code":"invalid_api_key"}}"#)
        .create_async()
        .await;

    let backend = setup_backend(server.url());
    let err = backend
        .create_assistant("Helper", "Be helpful", "gpt-4o-mini")
        .await
        .expect_err("request should fail");
    let err = err
        .downcast_ref::<OpenAIError>()
        .expect("error should be an OpenAIError");
    assert_eq!(err.http_code, 401);
    assert_eq!(err.message, "Incorrect API key");
    assert_eq!(err.code.as_deref(), Some("invalid_api_key"));
}

#[tokio::test]
async fn test_stream_run() {
    let body = sse(&[
        ("thread.run.created", r#"{"id":"run_1"}"#),
        ("thread.message.created", r#"{"id":"msg_1","content":[]}"#),
        (
            "thread.message.delta",
            r#"{"id":"msg_1","delta":{"content":[{"index":0,"type":"text","text":{"value":"Hel"}}]}}"#,
        ),
        (
            "thread.message.delta",
            r#"{"id":"msg_1","delta":{"content":[{"index":0,"type":"text","text":{"value":"lo"}}]}}"#,
        ),
        ("thread.message.completed", r#"{"id":"msg_1"}"#),
        ("thread.run.completed", r#"{"id":"run_1"}"#),
        ("done", "[DONE]"),
    ]);

    let mut server = mockito::Server::new_async().await;
    let handler = server
        .mock("POST", "/v1/threads/thread_abc/runs")
        .match_body(Matcher::Json(serde_json::json!({
            "assistant_id": "asst_1",
            "stream": true,
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let backend = setup_backend(server.url());
    let stream = backend
        .stream_run("asst_1", "thread_abc")
        .await
        .expect("stream run");
    let events = collect_events(stream).await;
    handler.assert_async().await;

    assert_eq!(
        events,
        vec![
            RunEvent::TextCreated(Some("msg_1".to_string())),
            RunEvent::TextDelta("Hel".to_string()),
            RunEvent::TextDelta("lo".to_string()),
            RunEvent::MessageCompleted(Some("msg_1".to_string())),
            RunEvent::End,
        ]
    );
}

#[tokio::test]
async fn test_stream_run_failure() {
    let body = sse(&[
        (
            "thread.message.delta",
            r#"{"id":"msg_1","delta":{"content":[{"index":0,"type":"text","text":{"value":"partial"}}]}}"#,
        ),
        (
            "thread.run.failed",
            r#"{"id":"run_1","last_error":{"code":"rate_limit_exceeded","message":"rate limited"}}"#,
        ),
    ]);

    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/threads/thread_abc/runs")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let backend = setup_backend(server.url());
    let stream = backend.stream_run("asst_1", "thread_abc").await.unwrap();
    let events = collect_events(stream).await;
    assert_eq!(
        events,
        vec![
            RunEvent::TextDelta("partial".to_string()),
            RunEvent::Error("rate limited".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_stream_run_rejected() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/threads/thread_abc/runs")
        .with_status(400)
        .with_body(r#"{"error":{"message":"Thread already has an active run","type":"invalid_request_error"}}"#)
        .create_async()
        .await;

    let backend = setup_backend(server.url());
    let err = backend
        .stream_run("asst_1", "thread_abc")
        .await
        .err()
        .expect("run should be rejected");
    assert!(err.to_string().contains("Thread already has an active run"));
}

#[test]
fn test_run_request_has_no_total_timeout() {
    let backend = setup_backend("http://localhost:1".to_string())
        .with_timeout(time::Duration::from_secs(60));

    let req = backend
        .request(reqwest::Method::GET, "/v1/threads/thread_abc/messages")
        .build()
        .unwrap();
    assert_eq!(req.timeout(), Some(&time::Duration::from_secs(60)));

    let run = RunRequest {
        assistant_id: "asst_1".to_string(),
        stream: true,
    };
    let req = backend.run_request("thread_abc", &run).build().unwrap();
    assert_eq!(req.method(), reqwest::Method::POST);
    assert_eq!(req.url().path(), "/v1/threads/thread_abc/runs");
    assert_eq!(req.timeout(), None);
    assert_eq!(
        req.headers().get("Authorization").unwrap(),
        "Bearer test_token"
    );
}

#[test]
fn test_run_events_error_frame() {
    let frame = Frame::new("error", r#"{"message":"server overloaded"}"#);
    let events = run_events(&frame).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].as_ref().unwrap(),
        &RunEvent::Error("server overloaded".to_string())
    );

    let frame = Frame::new("thread.message.delta", "not json");
    assert!(run_events(&frame).is_err());

    let frame = Frame::new("thread.run.step.created", "{}");
    assert!(run_events(&frame).unwrap().is_empty());
}

#[tokio::test]
async fn test_list_messages_paginates() {
    let mut server = mockito::Server::new_async().await;
    let first = server
        .mock("GET", "/v1/threads/thread_abc/messages")
        .match_query(Matcher::Exact("order=asc&limit=100".to_string()))
        .with_status(200)
        .with_body(
            serde_json::json!({
                "data": [
                    {"id": "msg_1", "role": "user", "created_at": 1_700_000_000,
                     "content": [{"type": "text", "text": {"value": "Hi", "annotations": []}}]},
                    {"id": "msg_2", "role": "assistant", "created_at": 1_700_000_005,
                     "content": [{"type": "image_file", "image_file": {"file_id": "file_1"}}]}
                ],
                "has_more": true,
                "last_id": "msg_2"
            })
            .to_string(),
        )
        .create_async()
        .await;
    let second = server
        .mock("GET", "/v1/threads/thread_abc/messages")
        .match_query(Matcher::Exact("order=asc&limit=100&after=msg_2".to_string()))
        .with_status(200)
        .with_body(
            serde_json::json!({
                "data": [
                    {"id": "msg_3", "role": "assistant", "created_at": 1_700_000_009,
                     "content": [{"type": "text", "text": {"value": "Hello", "annotations": []}}]}
                ],
                "has_more": false,
                "last_id": "msg_3"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let backend = setup_backend(server.url());
    let messages = backend
        .list_messages("thread_abc")
        .await
        .expect("list messages");
    first.assert_async().await;
    second.assert_async().await;

    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].id, "msg_1");
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "Hi");
    assert_eq!(messages[0].created_at.timestamp(), 1_700_000_000);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "");
    assert_eq!(messages[2].content, "Hello");
}

#[test]
fn test_init_rejects_bad_endpoint() {
    assert!(OpenAI::default().init().is_ok());
    assert!(OpenAI::default().with_endpoint("").init().is_err());
    assert!(OpenAI::default().with_endpoint("not a url").init().is_err());
}
