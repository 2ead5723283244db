#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;

use eyre::Result;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::frame::Frame;
use crate::models::{NewMessage, RunEvent, RunStream};
use crate::storage::ArcStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Done,
    Errored,
}

/// Summary of one relayed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub state: RelayState,
    /// Store id of the persisted assistant message, if any was saved.
    pub message_id: Option<i64>,
    /// Frames handed to the client before it went away.
    pub frames: usize,
}

/// Write side of the response body. Writes after the client went away are
/// dropped silently so the run can still be drained and saved.
struct FrameSink {
    tx: mpsc::Sender<Frame>,
    closed: bool,
    sent: usize,
}

impl FrameSink {
    async fn send(&mut self, frame: Frame) {
        if self.closed {
            return;
        }
        if self.tx.send(frame).await.is_err() {
            log::debug!("client disconnected, keep draining the run");
            self.closed = true;
            return;
        }
        self.sent += 1;
    }
}

/// Drives exactly one upstream run and persists the assistant reply at most
/// once, whichever of completion, end or error shows up first.
pub struct Relay {
    storage: ArcStorage,
    thread_id: i64,
    buffer: String,
    upstream_message_id: Option<String>,
    message_id: Option<i64>,
    completed_sent: bool,
    sink: FrameSink,
}

impl Relay {
    pub fn new(storage: ArcStorage, thread_id: i64, tx: mpsc::Sender<Frame>) -> Self {
        Self {
            storage,
            thread_id,
            buffer: String::new(),
            upstream_message_id: None,
            message_id: None,
            completed_sent: false,
            sink: FrameSink {
                tx,
                closed: false,
                sent: 0,
            },
        }
    }

    /// Consume the run until its terminal event. `run` is the result of
    /// starting the upstream run; a failure there ends the relay with an
    /// `error` frame.
    pub async fn run(mut self, run: Result<RunStream>) -> RunOutcome {
        let mut events = match run {
            Ok(events) => events,
            Err(err) => {
                log::error!("starting run for thread {}: {:#}", self.thread_id, err);
                return self.fail(format!("{:#}", err)).await;
            }
        };

        loop {
            let event = match events.next().await {
                Some(Ok(event)) => event,
                Some(Err(err)) => {
                    log::error!("reading run for thread {}: {:#}", self.thread_id, err);
                    RunEvent::Error(format!("{:#}", err))
                }
                None => {
                    log::debug!(
                        "run stream of thread {} ended without a terminal event",
                        self.thread_id
                    );
                    RunEvent::End
                }
            };

            match event {
                RunEvent::TextCreated(id) => {
                    if id.is_some() {
                        self.upstream_message_id = id;
                    }
                }
                RunEvent::TextDelta(text) => {
                    self.buffer.push_str(&text);
                    self.sink.send(Frame::token(text)).await;
                }
                RunEvent::MessageCompleted(id) => {
                    if id.is_some() {
                        self.upstream_message_id = id;
                    }
                    self.save().await;
                    if !self.completed_sent {
                        self.completed_sent = true;
                        self.sink.send(Frame::message_completed()).await;
                    }
                }
                RunEvent::End => {
                    self.save().await;
                    self.sink.send(Frame::done()).await;
                    return self.outcome(RelayState::Done);
                }
                RunEvent::Error(message) => return self.fail(message).await,
            }
        }
    }

    async fn fail(mut self, message: String) -> RunOutcome {
        self.save().await;
        self.sink.send(Frame::error(message)).await;
        self.outcome(RelayState::Errored)
    }

    /// Persist the buffer unless it is empty or already saved. A failed insert
    /// is logged and left for the next signal to retry.
    async fn save(&mut self) {
        if self.message_id.is_some() || self.buffer.is_empty() {
            return;
        }

        let message = NewMessage::assistant(self.thread_id, self.buffer.clone())
            .with_upstream_id(self.upstream_message_id.clone());
        match self.storage.insert_message(message).await {
            Ok(id) => {
                log::debug!("saved assistant message {} in thread {}", id, self.thread_id);
                self.message_id = Some(id);
            }
            Err(err) => {
                log::error!(
                    "saving assistant message in thread {}: {:#}",
                    self.thread_id,
                    err
                );
            }
        }
    }

    fn outcome(self, state: RelayState) -> RunOutcome {
        RunOutcome {
            state,
            message_id: self.message_id,
            frames: self.sink.sent,
        }
    }
}
