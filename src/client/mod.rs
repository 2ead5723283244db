pub mod api;
pub mod state;
pub mod stream;

pub use api::ChatClient;
pub use state::{Applied, ConversationState, Entry, EntryId};
pub use stream::StreamEvent;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("a message is already streaming in this conversation")]
    Busy,
    /// The server refused the request before streaming.
    #[error("server error ({status}): {message}")]
    Api { status: u16, message: String },
    /// The run ended with an `error` frame.
    #[error("run failed: {0}")]
    Run(String),
    #[error("stream ended before the run finished")]
    Interrupted,
    #[error("{0:#}")]
    Other(eyre::Report),
}

impl From<eyre::Report> for ClientError {
    fn from(err: eyre::Report) -> Self {
        ClientError::Other(err)
    }
}
