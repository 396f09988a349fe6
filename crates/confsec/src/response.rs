//! Response wrapper

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Deserializer, Serialize};

use crate::engine::{Engine, ResponseHandle};
use crate::error::{Error, Resource, Result};
use crate::guard::CloseGuard;
use crate::stream::ResponseStream;
use crate::wire::Headers;

/// Single response header as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    /// Header name
    pub key: String,
    /// Header value
    pub value: String,
}

/// Status line and headers of an engine response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// HTTP status code
    #[serde(alias = "statusCode")]
    pub status_code: u16,
    /// Reason phrase from the status line
    #[serde(default, alias = "reasonPhrase")]
    pub reason_phrase: String,
    /// Protocol version, e.g. `HTTP/1.1`
    #[serde(default, alias = "httpVersion")]
    pub http_version: String,
    /// Final URL of the request
    #[serde(default)]
    pub url: String,
    /// Headers in the order the engine reported them
    #[serde(default, deserialize_with = "null_as_empty")]
    pub headers: Vec<HeaderEntry>,
}

impl ResponseMetadata {
    /// Headers as an ordered [`Headers`] list
    pub fn header_list(&self) -> Headers {
        self.headers
            .iter()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<HeaderEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<HeaderEntry>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Owner of an engine response handle
///
/// Created by [`crate::ConfsecClient::do_request`]. Metadata, the streaming
/// flag and the body are each fetched from the engine at most once and cached
/// for the lifetime of the wrapper.
pub struct Response<E: Engine> {
    engine: Arc<E>,
    handle: ResponseHandle,
    guard: CloseGuard,
    metadata: OnceCell<ResponseMetadata>,
    is_streaming: OnceCell<bool>,
    body: OnceCell<Bytes>,
}

impl<E: Engine> fmt::Debug for Response<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("handle", &self.handle)
            .field("closed", &self.guard.is_closed())
            .field("metadata", &self.metadata.get())
            .field("is_streaming", &self.is_streaming.get())
            .finish_non_exhaustive()
    }
}

impl<E: Engine> Response<E> {
    pub(crate) fn new(engine: Arc<E>, handle: ResponseHandle) -> Self {
        tracing::trace!("Received response {}", handle);

        let teardown_engine = engine.clone();
        let guard = CloseGuard::new(move || {
            tracing::trace!("Destroying response {}", handle);
            teardown_engine.response_destroy(handle)?;
            Ok(())
        });

        Self {
            engine,
            handle,
            guard,
            metadata: OnceCell::new(),
            is_streaming: OnceCell::new(),
            body: OnceCell::new(),
        }
    }

    /// Engine handle of this response
    pub fn handle(&self) -> ResponseHandle {
        self.handle
    }

    /// Whether the response has been closed
    pub fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.guard.is_closed() {
            return Err(Error::NotFound(Resource::Response));
        }
        Ok(())
    }

    /// Status line and headers
    pub fn metadata(&self) -> Result<&ResponseMetadata> {
        if let Some(metadata) = self.metadata.get() {
            return Ok(metadata);
        }
        self.ensure_open()?;

        self.metadata.get_or_try_init(|| {
            let raw = self.engine.response_metadata(self.handle)?;
            Ok(serde_json::from_slice(&raw)?)
        })
    }

    /// Whether the body is delivered as a chunk stream
    pub fn is_streaming(&self) -> Result<bool> {
        if let Some(is_streaming) = self.is_streaming.get() {
            return Ok(*is_streaming);
        }
        self.ensure_open()?;

        self.is_streaming
            .get_or_try_init(|| Ok::<_, Error>(self.engine.response_is_streaming(self.handle)?))
            .copied()
    }

    /// Full body of a non-streaming response
    ///
    /// Prefer [`Response::into_stream`] when [`Response::is_streaming`] is
    /// true.
    pub fn body(&self) -> Result<Bytes> {
        if let Some(body) = self.body.get() {
            return Ok(body.clone());
        }
        self.ensure_open()?;

        self.body
            .get_or_try_init(|| Ok::<_, Error>(Bytes::from(self.engine.response_body(self.handle)?)))
            .cloned()
    }

    /// Open the chunk stream, handing ownership of this response to it
    ///
    /// Closing the returned stream closes this response as well.
    pub fn into_stream(self) -> Result<ResponseStream<E>> {
        self.ensure_open()?;
        let stream = self.engine.response_stream(self.handle)?;
        Ok(ResponseStream::new(self.engine.clone(), stream, self))
    }

    /// Destroy the response handle
    ///
    /// Only the first call reaches the engine.
    pub fn close(&self) -> Result<()> {
        self.guard.close()
    }
}

impl<E: Engine> Drop for Response<E> {
    fn drop(&mut self) {
        if let Err(err) = self.guard.close() {
            tracing::warn!("Failed to destroy response {}: {}", self.handle, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_snake_case() {
        let metadata: ResponseMetadata = serde_json::from_str(
            r#"{
                "status_code": 200,
                "reason_phrase": "OK",
                "http_version": "HTTP/1.1",
                "url": "https://api.example.com/v1/completions",
                "headers": [{"key": "content-type", "value": "application/json"}]
            }"#,
        )
        .expect("valid metadata");

        assert_eq!(metadata.status_code, 200);
        assert_eq!(metadata.reason_phrase, "OK");
        assert_eq!(metadata.http_version, "HTTP/1.1");
        assert_eq!(
            metadata.header_list().get("Content-Type"),
            Some("application/json")
        );
    }

    #[test]
    fn test_metadata_camel_case_and_null_headers() {
        let metadata: ResponseMetadata = serde_json::from_str(
            r#"{"statusCode": 404, "reasonPhrase": "Not Found", "httpVersion": "HTTP/1.1", "url": "", "headers": null}"#,
        )
        .expect("valid metadata");

        assert_eq!(metadata.status_code, 404);
        assert_eq!(metadata.reason_phrase, "Not Found");
        assert!(metadata.headers.is_empty());
    }

    #[test]
    fn test_metadata_requires_status() {
        let result: Result<ResponseMetadata, _> = serde_json::from_str(r#"{"headers": []}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_metadata_keeps_duplicate_headers_in_order() {
        let metadata: ResponseMetadata = serde_json::from_str(
            r#"{"status_code": 200, "headers": [
                {"key": "Set-Cookie", "value": "a=1"},
                {"key": "Set-Cookie", "value": "b=2"}
            ]}"#,
        )
        .expect("valid metadata");

        let headers = metadata.header_list();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec![("Set-Cookie", "a=1"), ("Set-Cookie", "b=2")]
        );
    }
}
