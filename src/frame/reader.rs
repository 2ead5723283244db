#[cfg(test)]
#[path = "reader_test.rs"]
mod tests;

use std::{collections::VecDeque, pin::Pin};

use eyre::{Context, Result};
use futures::{Stream, StreamExt};

use super::{Frame, FrameDecoder};

type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Pulls frames out of a chunked byte stream, one at a time.
pub struct FrameReader {
    inner: ByteStream,
    decoder: FrameDecoder,
    ready: VecDeque<Frame>,
    eof: bool,
}

impl FrameReader {
    pub fn new<S, B, E>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
        B: AsRef<[u8]>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let inner = stream.map(|chunk| {
            chunk
                .map(|bytes| bytes.as_ref().to_vec())
                .map_err(eyre::Report::new)
        });
        Self {
            inner: Box::pin(inner),
            decoder: FrameDecoder::new(),
            ready: VecDeque::new(),
            eof: false,
        }
    }

    /// Next complete frame, or `None` once the byte stream has ended.
    /// Bytes left over after the end of the stream never formed a frame and
    /// are dropped.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }
            if self.eof {
                return Ok(None);
            }

            match self.inner.next().await {
                Some(chunk) => {
                    let chunk = chunk.wrap_err("reading event stream")?;
                    self.ready.extend(self.decoder.push(&chunk));
                }
                None => {
                    self.eof = true;
                    if self.decoder.pending() > 0 {
                        log::debug!(
                            "event stream ended with {} bytes of incomplete frame",
                            self.decoder.pending()
                        );
                    }
                }
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Frame>> + Send {
        futures::stream::unfold(self, |mut reader| async move {
            match reader.next_frame().await {
                Ok(Some(frame)) => Some((Ok(frame), reader)),
                Ok(None) => None,
                Err(err) => {
                    reader.eof = true;
                    reader.ready.clear();
                    Some((Err(err), reader))
                }
            }
        })
    }
}
