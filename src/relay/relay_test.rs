use std::sync::Arc;

use futures::stream;

use super::*;
use crate::frame::{EVENT_DONE, EVENT_ERROR, EVENT_TOKEN};
use crate::models::{Message, Role};
use crate::storage::{MockStorage, Storage, sqlite::Sqlite};

async fn setup() -> (Arc<Sqlite>, i64) {
    let db = Sqlite::new(None).await.unwrap();
    let assistant = db
        .create_assistant("asst_1", "Helper", "Be helpful")
        .await
        .unwrap();
    let thread = db
        .create_thread("thread_1", "Chat", assistant.id)
        .await
        .unwrap();
    (Arc::new(db), thread.id)
}

fn events(events: Vec<RunEvent>) -> Result<RunStream> {
    Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
}

fn delta(text: &str) -> RunEvent {
    RunEvent::TextDelta(text.to_string())
}

fn completed(id: &str) -> RunEvent {
    RunEvent::MessageCompleted(Some(id.to_string()))
}

fn error(message: &str) -> RunEvent {
    RunEvent::Error(message.to_string())
}

async fn relay(
    storage: ArcStorage,
    thread_id: i64,
    run: Result<RunStream>,
) -> (RunOutcome, Vec<Frame>) {
    let (tx, mut rx) = mpsc::channel(64);
    let outcome = Relay::new(storage, thread_id, tx).run(run).await;
    let mut frames = vec![];
    while let Some(frame) = rx.recv().await {
        frames.push(frame);
    }
    (outcome, frames)
}

async fn assistant_messages(db: &Sqlite, thread_id: i64) -> Vec<Message> {
    db.get_messages(thread_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.role == Role::Assistant)
        .collect()
}

#[tokio::test]
async fn test_hello_scenario() {
    let (db, thread_id) = setup().await;
    let (outcome, frames) = relay(
        db.clone(),
        thread_id,
        events(vec![delta("Hel"), delta("lo"), completed("m1"), RunEvent::End]),
    )
    .await;

    assert_eq!(outcome.state, RelayState::Done);
    assert_eq!(outcome.frames, 4);
    assert_eq!(
        frames,
        vec![
            Frame::token("Hel"),
            Frame::token("lo"),
            Frame::new("message_completed", "done"),
            Frame::new("done", "[DONE]"),
        ]
    );

    let saved = assistant_messages(&db, thread_id).await;
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].content, "Hello");
    assert_eq!(saved[0].openai_message_id.as_deref(), Some("m1"));
    assert_eq!(outcome.message_id, Some(saved[0].id));
}

#[tokio::test]
async fn test_partial_output_saved_on_error() {
    let (db, thread_id) = setup().await;
    let (outcome, frames) = relay(
        db.clone(),
        thread_id,
        events(vec![delta("partial"), error("rate limited")]),
    )
    .await;

    assert_eq!(outcome.state, RelayState::Errored);
    assert_eq!(
        frames,
        vec![Frame::token("partial"), Frame::new("error", "rate limited")]
    );
    assert!(frames.iter().all(|f| f.event() != EVENT_DONE));

    let saved = assistant_messages(&db, thread_id).await;
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].content, "partial");
    assert_eq!(saved[0].openai_message_id, None);
}

#[tokio::test]
async fn test_exactly_once_save_for_any_signal_order() {
    let orders: Vec<Vec<RunEvent>> = vec![
        vec![completed("m1"), RunEvent::End],
        vec![completed("m1"), error("boom")],
        vec![RunEvent::End, completed("m1")],
        vec![error("boom"), completed("m1")],
        vec![RunEvent::End, error("boom")],
        vec![completed("m1"), completed("m1"), RunEvent::End],
        vec![RunEvent::End],
        vec![error("boom")],
        vec![],
    ];

    for signals in orders {
        let (db, thread_id) = setup().await;
        let mut run = vec![delta("a"), delta("b"), delta("c")];
        run.extend(signals.clone());
        let (outcome, frames) = relay(db.clone(), thread_id, events(run)).await;

        let saved = assistant_messages(&db, thread_id).await;
        assert_eq!(saved.len(), 1, "signals: {:?}", signals);
        assert_eq!(saved[0].content, "abc", "signals: {:?}", signals);
        assert_eq!(outcome.message_id, Some(saved[0].id));

        let terminals = frames.iter().filter(|f| f.is_terminal()).count();
        assert_eq!(terminals, 1, "signals: {:?}", signals);
        assert!(frames.last().unwrap().is_terminal());
    }
}

#[tokio::test]
async fn test_empty_buffer_saves_nothing() {
    for run in [
        vec![RunEvent::End],
        vec![completed("m1"), RunEvent::End],
        vec![error("boom")],
        vec![RunEvent::TextCreated(Some("m1".to_string())), RunEvent::End],
    ] {
        let (db, thread_id) = setup().await;
        let (outcome, frames) = relay(db.clone(), thread_id, events(run)).await;
        assert_eq!(outcome.message_id, None);
        assert!(assistant_messages(&db, thread_id).await.is_empty());
        assert!(frames.last().unwrap().is_terminal());
    }
}

#[tokio::test]
async fn test_tokens_follow_deltas_and_stop_at_terminal() {
    let (db, thread_id) = setup().await;
    let deltas = ["line one\n", "", "line two", " \n\nend"];
    let mut run = deltas.iter().map(|d| delta(d)).collect::<Vec<_>>();
    run.push(RunEvent::End);
    run.push(delta("ignored"));
    run.push(error("ignored"));

    let (outcome, frames) = relay(db.clone(), thread_id, events(run)).await;
    assert_eq!(outcome.state, RelayState::Done);

    let tokens = frames
        .iter()
        .filter(|f| f.event() == EVENT_TOKEN)
        .map(|f| f.data())
        .collect::<Vec<_>>();
    assert_eq!(tokens, deltas.to_vec());
    assert_eq!(frames.last().unwrap().event(), EVENT_DONE);
    assert_eq!(frames.len(), deltas.len() + 1);

    let saved = assistant_messages(&db, thread_id).await;
    assert_eq!(saved[0].content, deltas.concat());
}

#[tokio::test]
async fn test_text_created_id_is_fallback() {
    let (db, thread_id) = setup().await;
    let run = vec![
        RunEvent::TextCreated(Some("msg_a".to_string())),
        delta("x"),
        RunEvent::TextCreated(Some("msg_b".to_string())),
        delta("y"),
        RunEvent::MessageCompleted(None),
        RunEvent::End,
    ];
    relay(db.clone(), thread_id, events(run)).await;

    let saved = assistant_messages(&db, thread_id).await;
    assert_eq!(saved[0].openai_message_id.as_deref(), Some("msg_b"));
}

#[tokio::test]
async fn test_stream_without_terminal_counts_as_end() {
    let (db, thread_id) = setup().await;
    let (outcome, frames) = relay(db.clone(), thread_id, events(vec![delta("hi")])).await;
    assert_eq!(outcome.state, RelayState::Done);
    assert_eq!(frames.last().unwrap().event(), EVENT_DONE);
    assert_eq!(assistant_messages(&db, thread_id).await.len(), 1);
}

#[tokio::test]
async fn test_run_that_fails_to_start() {
    let (db, thread_id) = setup().await;
    let (outcome, frames) = relay(
        db.clone(),
        thread_id,
        Err(eyre::eyre!("thread already has an active run")),
    )
    .await;

    assert_eq!(outcome.state, RelayState::Errored);
    assert_eq!(
        frames,
        vec![Frame::error("thread already has an active run")]
    );
    assert!(assistant_messages(&db, thread_id).await.is_empty());
}

#[tokio::test]
async fn test_stream_error_after_deltas() {
    let (db, thread_id) = setup().await;
    let run: RunStream = Box::pin(stream::iter(vec![
        Ok(delta("par")),
        Ok(delta("tial")),
        Err(eyre::eyre!("connection reset")),
        Ok(RunEvent::End),
    ]));
    let (outcome, frames) = relay(db.clone(), thread_id, Ok(run)).await;

    assert_eq!(outcome.state, RelayState::Errored);
    let last = frames.last().unwrap();
    assert_eq!(last.event(), EVENT_ERROR);
    assert_eq!(last.data(), "connection reset");
    assert_eq!(assistant_messages(&db, thread_id).await[0].content, "partial");
}

#[tokio::test]
async fn test_failed_save_still_ends_stream() {
    let mut storage = MockStorage::new();
    storage
        .expect_insert_message()
        .times(1)
        .returning(|_| Err(eyre::eyre!("disk I/O error")));

    let (outcome, frames) = relay(
        Arc::new(storage),
        1,
        events(vec![delta("lost"), RunEvent::End]),
    )
    .await;

    assert_eq!(outcome.state, RelayState::Done);
    assert_eq!(outcome.message_id, None);
    assert_eq!(frames, vec![Frame::token("lost"), Frame::done()]);
}

#[tokio::test]
async fn test_failed_save_is_retried_by_next_signal() {
    let mut seq = mockall::Sequence::new();
    let mut storage = MockStorage::new();
    storage
        .expect_insert_message()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(eyre::eyre!("database is locked")));
    storage
        .expect_insert_message()
        .withf(|m| m.content() == "retry" && m.upstream_id() == Some("m1"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(42));

    let (outcome, frames) = relay(
        Arc::new(storage),
        1,
        events(vec![delta("retry"), completed("m1"), RunEvent::End]),
    )
    .await;

    assert_eq!(outcome.message_id, Some(42));
    assert_eq!(
        frames,
        vec![Frame::token("retry"), Frame::message_completed(), Frame::done()]
    );
}

#[tokio::test]
async fn test_client_disconnect_still_saves() {
    let (db, thread_id) = setup().await;
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let outcome = Relay::new(db.clone(), thread_id, tx)
        .run(events(vec![
            delta("nobody "),
            delta("listens"),
            completed("m9"),
            RunEvent::End,
        ]))
        .await;

    assert_eq!(outcome.state, RelayState::Done);
    assert_eq!(outcome.frames, 0);
    let saved = assistant_messages(&db, thread_id).await;
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].content, "nobody listens");
    assert_eq!(saved[0].openai_message_id.as_deref(), Some("m9"));
}
