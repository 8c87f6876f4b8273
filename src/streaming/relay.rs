//! Relaying translated chunks to their consumer
//!
//! The upstream body is read one piece at a time and every chunk is handed
//! to a [`ChunkSink`] before the next read. Client sinks are bounded
//! channels, so a slow client holds back the upstream read instead of
//! letting chunks pile up in memory.

use super::accumulator::StreamAccumulator;
use super::chunk::NormalizedChunk;
use super::translator::StreamTranslator;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use pin_project_lite::pin_project;
use std::convert::Infallible;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

/// Chunks buffered between the relay and a client connection
pub const CLIENT_CHANNEL_CAPACITY: usize = 32;

/// Reason carried by the terminal marker of a cancelled stream
pub const ABORTED_REASON: &str = "Request aborted";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Chunk consumer has gone away")]
pub struct SinkClosed;

/// Destination of normalized chunks
#[async_trait]
pub trait ChunkSink: Send {
    /// Resolves once the consumer has accepted the chunk
    async fn emit(&mut self, chunk: &NormalizedChunk) -> Result<(), SinkClosed>;
}

/// SSE-encoding sink feeding an HTTP response body
#[derive(Debug, Clone)]
pub struct ClientSink {
    tx: mpsc::Sender<Bytes>,
}

impl ClientSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);
        (Self::new(tx), rx)
    }

    /// Write pre-framed bytes
    pub async fn send_raw(&self, bytes: Bytes) -> Result<(), SinkClosed> {
        self.tx.send(bytes).await.map_err(|_| SinkClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl ChunkSink for ClientSink {
    async fn emit(&mut self, chunk: &NormalizedChunk) -> Result<(), SinkClosed> {
        self.send_raw(chunk.to_sse()).await
    }
}

/// Callback invoked for every chunk, including the terminal marker
pub type ChunkCallback = Box<dyn FnMut(&NormalizedChunk) + Send>;

pub struct CallbackSink {
    callback: ChunkCallback,
}

impl CallbackSink {
    pub fn new(callback: ChunkCallback) -> Self {
        Self { callback }
    }
}

impl fmt::Debug for CallbackSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSink").finish_non_exhaustive()
    }
}

#[async_trait]
impl ChunkSink for CallbackSink {
    async fn emit(&mut self, chunk: &NormalizedChunk) -> Result<(), SinkClosed> {
        (self.callback)(chunk);
        Ok(())
    }
}

/// How a relayed stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    Completed,
    Failed(String),
    Aborted,
}

/// Pump an upstream body through the translator into the sink
///
/// Cancellation stops the read immediately and delivers an abort marker. A
/// sink that goes away cancels the token so the upstream call is dropped.
pub async fn relay<S, E>(
    body: S,
    translator: &mut StreamTranslator,
    sink: &mut dyn ChunkSink,
    cancel: &CancellationToken,
) -> (StreamAccumulator, StreamEnd)
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: fmt::Display + Send,
{
    let mut body = std::pin::pin!(body);
    let mut accumulator = StreamAccumulator::new();

    loop {
        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            item = body.next() => Some(item),
        };

        let chunks = match read {
            None => {
                if let Some(marker) = translator.fail(ABORTED_REASON) {
                    accumulator.observe(&marker);
                    // The consumer may already be gone
                    let _ = sink.emit(&marker).await;
                }
                return (accumulator, StreamEnd::Aborted);
            }
            Some(Some(Ok(bytes))) => translator.push(&bytes),
            Some(Some(Err(error))) => translator.fail(error.to_string()).into_iter().collect(),
            Some(None) => translator.finish(),
        };

        for chunk in chunks {
            accumulator.observe(&chunk);

            if sink.emit(&chunk).await.is_err() {
                debug!("Consumer disconnected; cancelling upstream read");
                cancel.cancel();
                return (accumulator, StreamEnd::Aborted);
            }

            if let NormalizedChunk::Done { error } = chunk {
                let end = match error {
                    None => StreamEnd::Completed,
                    Some(message) => StreamEnd::Failed(message),
                };
                return (accumulator, end);
            }
        }
    }
}

pin_project! {
    /// Stream that cancels a token if dropped before it is exhausted
    pub struct CancelOnDrop<S> {
        #[pin]
        inner: S,
        guard: Option<DropGuard>,
    }
}

impl<S> CancelOnDrop<S> {
    pub fn new(inner: S, cancel: CancellationToken) -> Self {
        Self {
            inner,
            guard: Some(cancel.drop_guard()),
        }
    }
}

impl<S: Stream> Stream for CancelOnDrop<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match this.inner.poll_next(cx) {
            Poll::Ready(None) => {
                if let Some(guard) = this.guard.take() {
                    guard.disarm();
                }
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

/// Response body reading from a client sink channel
///
/// Dropping the body (client disconnect) cancels `cancel`.
pub fn client_body(rx: mpsc::Receiver<Bytes>, cancel: CancellationToken) -> axum::body::Body {
    let frames = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|bytes| (Ok::<Bytes, Infallible>(bytes), rx))
    });
    axum::body::Body::from_stream(CancelOnDrop::new(frames, cancel))
}
