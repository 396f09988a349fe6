//! Request and response bodies

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::future::Future;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::{Engine, EngineError};
use crate::error::{Error, Result};
use crate::stream::ResponseStream;

/// Error type accepted from caller-supplied body streams
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body of an outgoing request
///
/// Stream bodies are buffered in full before the request is serialized.
pub enum RequestBody {
    /// In-memory bytes
    Bytes(Bytes),
    /// Asynchronous byte source
    Stream(BoxStream<'static, std::result::Result<Bytes, BoxError>>),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            RequestBody::Stream(_) => f.debug_tuple("Stream").finish_non_exhaustive(),
        }
    }
}

impl RequestBody {
    /// Body read from an asynchronous byte stream
    pub fn from_stream<S, B, E>(source: S) -> Self
    where
        S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
        B: Into<Bytes>,
        E: Into<BoxError>,
    {
        RequestBody::Stream(
            source
                .map(|chunk| chunk.map(Into::into).map_err(Into::into))
                .boxed(),
        )
    }

    /// Read the whole body into memory
    pub async fn into_bytes(self) -> Result<Bytes> {
        match self {
            RequestBody::Bytes(bytes) => Ok(bytes),
            RequestBody::Stream(mut source) => {
                let mut buffer = BytesMut::new();
                while let Some(chunk) = source.next().await {
                    let chunk =
                        chunk.map_err(|err| Error::InvalidRequest(format!("body read failed: {err}")))?;
                    buffer.extend_from_slice(&chunk);
                }
                Ok(buffer.freeze())
            }
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Bytes(bytes.into())
    }
}

impl From<&'static [u8]> for RequestBody {
    fn from(bytes: &'static [u8]) -> Self {
        RequestBody::Bytes(Bytes::from_static(bytes))
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Bytes(text.into())
    }
}

impl From<&'static str> for RequestBody {
    fn from(text: &'static str) -> Self {
        RequestBody::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

/// Live body of a streaming response
///
/// Yields chunks in engine order and ends after the engine signals end of
/// stream. Dropping it before the end cancels the stream and releases the
/// engine handles.
pub struct BodyStream {
    inner: BoxStream<'static, Result<Bytes>>,
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream").finish_non_exhaustive()
    }
}

impl BodyStream {
    pub(crate) fn from_response_stream<E: Engine>(stream: ResponseStream<E>) -> Self {
        Self {
            inner: ChunkBridge::new(stream).boxed(),
        }
    }

    pub(crate) fn from_bytes(bytes: Bytes) -> Self {
        let inner = if bytes.is_empty() {
            stream::empty().boxed()
        } else {
            stream::once(async move { Ok(bytes) }).boxed()
        };
        Self { inner }
    }

    /// Read the remaining chunks into one buffer
    pub async fn collect_bytes(mut self) -> Result<Bytes> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.inner.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }
}

impl Stream for BodyStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Response body, either fully buffered or streamed from the engine
#[derive(Debug)]
pub enum Body {
    /// Complete payload
    Full(Bytes),
    /// Chunks pulled from the engine on demand
    Stream(BodyStream),
}

struct Pulled<E: Engine> {
    stream: ResponseStream<E>,
    chunk: Result<Option<Bytes>>,
}

enum BridgeState<E: Engine> {
    Idle(ResponseStream<E>),
    Pulling(JoinHandle<Pulled<E>>),
    Done,
}

/// Turns the blocking, pull-based [`ResponseStream`] into an async [`Stream`]
///
/// Each poll without a pull in flight issues exactly one `next_chunk` on the
/// blocking pool. Dropping the bridge closes the stream right away when idle;
/// with a pull in flight the cancellation token makes the pulling task close
/// it as soon as the engine call returns.
struct ChunkBridge<E: Engine> {
    state: BridgeState<E>,
    cancel: CancellationToken,
}

impl<E: Engine> ChunkBridge<E> {
    fn new(stream: ResponseStream<E>) -> Self {
        Self {
            state: BridgeState::Idle(stream),
            cancel: CancellationToken::new(),
        }
    }
}

impl<E: Engine> Stream for ChunkBridge<E> {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match std::mem::replace(&mut self.state, BridgeState::Done) {
                BridgeState::Idle(stream) => {
                    let cancel = self.cancel.clone();
                    let pull = tokio::task::spawn_blocking(move || {
                        let chunk = stream.next_chunk();
                        if cancel.is_cancelled() {
                            if let Err(err) = stream.close() {
                                tracing::warn!("Failed to close cancelled stream: {}", err);
                            }
                        }
                        Pulled { stream, chunk }
                    });
                    self.state = BridgeState::Pulling(pull);
                }
                BridgeState::Pulling(mut pull) => {
                    return match Pin::new(&mut pull).poll(cx) {
                        Poll::Pending => {
                            self.state = BridgeState::Pulling(pull);
                            Poll::Pending
                        }
                        Poll::Ready(Ok(Pulled { stream, chunk })) => match chunk {
                            Ok(Some(bytes)) => {
                                self.state = BridgeState::Idle(stream);
                                Poll::Ready(Some(Ok(bytes)))
                            }
                            // End of stream already closed the stream and its response
                            Ok(None) => Poll::Ready(None),
                            Err(err) => {
                                if let Err(close_err) = stream.close() {
                                    tracing::warn!(
                                        "Failed to close stream after pull error: {}",
                                        close_err
                                    );
                                }
                                Poll::Ready(Some(Err(err)))
                            }
                        },
                        Poll::Ready(Err(join_err)) => Poll::Ready(Some(Err(Error::Engine(
                            EngineError::new(format!("stream pull task failed: {join_err}")),
                        )))),
                    };
                }
                BridgeState::Done => return Poll::Ready(None),
            }
        }
    }
}

impl<E: Engine> Drop for ChunkBridge<E> {
    fn drop(&mut self) {
        match std::mem::replace(&mut self.state, BridgeState::Done) {
            BridgeState::Idle(stream) => {
                tracing::debug!("Body stream cancelled, closing stream {}", stream.handle());
                if let Err(err) = stream.close() {
                    tracing::warn!("Failed to close cancelled stream: {}", err);
                }
            }
            BridgeState::Pulling(_) => {
                tracing::debug!("Body stream cancelled during a pull");
                self.cancel.cancel();
            }
            BridgeState::Done => {}
        }
    }
}
