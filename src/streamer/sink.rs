//! Output sinks for streamed exports and the keep-alive adapter.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;

/// Sent when the producer has been idle for a keep-alive interval.
/// Whitespace is valid between JSON tokens and harmless in text output.
pub const KEEP_ALIVE_FILLER: &str = " ";

/// Destination for serialized export chunks
///
/// A failed write ends the export early; this is how a client disconnect
/// reaches the page loop.
#[async_trait]
pub trait ResultSink: Send {
    /// Write one chunk
    async fn write(&mut self, chunk: String) -> io::Result<()>;
}

/// Collects everything in memory
#[async_trait]
impl ResultSink for String {
    async fn write(&mut self, chunk: String) -> io::Result<()> {
        self.push_str(&chunk);
        Ok(())
    }
}

/// Sink feeding a bounded channel, drained by an HTTP response body
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel
    ///
    /// `capacity` bounds how many chunks may wait for a slow consumer.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ResultSink for ChannelSink {
    async fn write(&mut self, chunk: String) -> io::Result<()> {
        self.tx.send(chunk).await.map_err(|_| {
            io::Error::new(io::ErrorKind::BrokenPipe, "export consumer went away")
        })
    }
}

/// Interleave [`KEEP_ALIVE_FILLER`] into a chunk stream
///
/// A filler is emitted every `interval` while no chunk arrives. The stream
/// ends when `chunks` ends.
pub fn keep_alive<S>(chunks: S, interval: Duration) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = String> + Unpin + Send,
{
    futures::stream::unfold(chunks, move |mut chunks| async move {
        match tokio::time::timeout(interval, chunks.next()).await {
            Ok(Some(chunk)) => Some((chunk, chunks)),
            Ok(None) => None,
            Err(_) => Some((KEEP_ALIVE_FILLER.to_string(), chunks)),
        }
    })
}
