//! Stream wrapper
//!
//! A [`ResponseStream`] owns the engine stream handle and the response it was
//! opened from. The stream handle lives strictly inside the response handle,
//! so closing the stream always destroys the stream first and the response
//! second. Exhausting the stream closes it.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::engine::{Engine, ResponseHandle, StreamHandle};
use crate::error::{Error, Resource, Result};
use crate::guard::CloseGuard;
use crate::response::{Response, ResponseMetadata};

/// Forward-only chunk stream of a streaming response
///
/// Any operation after close, including reads after end of stream, fails with
/// `stream not found`. The [`Iterator`] impl is the exception: it yields
/// `None` once the stream is closed.
///
/// The parent response is only reachable through read-only accessors, so it
/// can never be destroyed while the stream is open.
pub struct ResponseStream<E: Engine> {
    engine: Arc<E>,
    handle: StreamHandle,
    guard: CloseGuard,
    parent: Response<E>,
}

impl<E: Engine> fmt::Debug for ResponseStream<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream")
            .field("handle", &self.handle)
            .field("closed", &self.guard.is_closed())
            .field("parent", &self.parent.handle())
            .finish_non_exhaustive()
    }
}

impl<E: Engine> ResponseStream<E> {
    pub(crate) fn new(engine: Arc<E>, handle: StreamHandle, parent: Response<E>) -> Self {
        tracing::trace!("Opened stream {} on response {}", handle, parent.handle());

        let teardown_engine = engine.clone();
        let guard = CloseGuard::new(move || {
            tracing::trace!("Destroying stream {}", handle);
            teardown_engine.stream_destroy(handle)?;
            Ok(())
        });

        Self {
            engine,
            handle,
            guard,
            parent,
        }
    }

    /// Engine handle of this stream
    pub fn handle(&self) -> StreamHandle {
        self.handle
    }

    /// Engine handle of the response this stream was opened from
    pub fn response_handle(&self) -> ResponseHandle {
        self.parent.handle()
    }

    /// Status line and headers of the parent response
    pub fn metadata(&self) -> Result<&ResponseMetadata> {
        self.parent.metadata()
    }

    /// Whether the stream has been closed
    pub fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }

    /// Pull the next chunk
    ///
    /// Returns `Ok(None)` at end of stream, after closing the stream and its
    /// parent response.
    pub fn next_chunk(&self) -> Result<Option<Bytes>> {
        if self.guard.is_closed() {
            return Err(Error::NotFound(Resource::Stream));
        }

        match self.engine.stream_next(self.handle)? {
            Some(chunk) => Ok(Some(Bytes::from(chunk))),
            None => {
                tracing::trace!("Stream {} exhausted", self.handle);
                self.close()?;
                Ok(None)
            }
        }
    }

    /// Destroy the stream handle, then the parent response handle
    ///
    /// Only the first call reaches the engine. The parent is closed even when
    /// destroying the stream fails.
    pub fn close(&self) -> Result<()> {
        let stream = self.guard.close();
        let parent = self.parent.close();
        stream.and(parent)
    }
}

impl<E: Engine> Iterator for ResponseStream<E> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.guard.is_closed() {
            return None;
        }
        self.next_chunk().transpose()
    }
}

impl<E: Engine> Drop for ResponseStream<E> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!("Failed to close stream {}: {}", self.handle, err);
        }
    }
}
