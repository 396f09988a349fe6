//! Fetch response

use bytes::Bytes;
use serde::de::DeserializeOwned;

use super::body::{Body, BodyStream};
use crate::error::{Error, Result};
use crate::response::ResponseMetadata;
use crate::wire::Headers;

/// Response returned by [`crate::fetch`]
///
/// Status, reason phrase and headers are taken verbatim from the engine
/// metadata.
#[derive(Debug)]
pub struct FetchResponse {
    status: u16,
    status_text: String,
    http_version: String,
    url: String,
    headers: Headers,
    body: Body,
}

impl FetchResponse {
    pub(crate) fn new(metadata: &ResponseMetadata, body: Body) -> Self {
        Self {
            status: metadata.status_code,
            status_text: metadata.reason_phrase.clone(),
            http_version: metadata.http_version.clone(),
            url: metadata.url.clone(),
            headers: metadata.header_list(),
            body,
        }
    }

    /// Get the HTTP status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Reason phrase of the status line
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Protocol version reported by the engine
    pub fn http_version(&self) -> &str {
        &self.http_version
    }

    /// Final URL reported by the engine
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Response headers in engine order
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// First value of a header, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Check if the response status is a success (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the body is streamed from the engine
    pub fn is_streaming(&self) -> bool {
        matches!(self.body, Body::Stream(_))
    }

    /// Borrow the body
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Take the body
    pub fn into_body(self) -> Body {
        self.body
    }

    /// Take the body as a chunk stream
    ///
    /// A buffered body is yielded as a single chunk.
    pub fn into_body_stream(self) -> BodyStream {
        match self.body {
            Body::Full(bytes) => BodyStream::from_bytes(bytes),
            Body::Stream(stream) => stream,
        }
    }

    /// Get the response body as bytes
    pub async fn bytes(self) -> Result<Bytes> {
        match self.body {
            Body::Full(bytes) => Ok(bytes),
            Body::Stream(stream) => stream.collect_bytes().await,
        }
    }

    /// Get the response body as text
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|err| Error::InvalidBody(format!("body is not UTF-8: {err}")))
    }

    /// Get the response body as JSON
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Convert into an `http::Response`
    ///
    /// Header names are normalized by `http` and the reason phrase is dropped.
    /// Headers `http` cannot represent are skipped.
    pub fn into_http(self) -> Result<http::Response<Body>> {
        let mut builder = http::Response::builder().status(self.status);

        for (name, value) in self.headers.iter() {
            match (
                http::HeaderName::from_bytes(name.as_bytes()),
                http::HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => builder = builder.header(name, value),
                _ => tracing::debug!("Skipping header not representable in http: {}", name),
            }
        }

        builder
            .body(self.body)
            .map_err(|err| Error::InvalidBody(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::response::HeaderEntry;

    fn metadata() -> ResponseMetadata {
        ResponseMetadata {
            status_code: 201,
            reason_phrase: "Created".to_string(),
            http_version: "HTTP/1.1".to_string(),
            url: "https://api.example.com/items".to_string(),
            headers: vec![HeaderEntry {
                key: "Content-Type".to_string(),
                value: "application/json".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn test_full_body_accessors() {
        let response = FetchResponse::new(&metadata(), Body::Full(Bytes::from_static(br#"{"a":1}"#)));

        assert_eq!(response.status(), 201);
        assert_eq!(response.status_text(), "Created");
        assert_eq!(response.http_version(), "HTTP/1.1");
        assert_eq!(response.url(), "https://api.example.com/items");
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert!(response.is_success());
        assert!(!response.is_streaming());

        let value: serde_json::Value = response.json().await.expect("valid JSON body");
        assert_eq!(value, serde_json::json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_text_rejects_invalid_utf8() {
        let response = FetchResponse::new(&metadata(), Body::Full(Bytes::from_static(&[0xff, 0xfe])));
        assert!(matches!(response.text().await, Err(Error::InvalidBody(_))));
    }

    #[tokio::test]
    async fn test_full_body_as_stream() {
        let response = FetchResponse::new(&metadata(), Body::Full(Bytes::from_static(b"hello")));
        let chunks: Vec<_> = response.into_body_stream().collect().await;

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().expect("chunk"), &Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_into_http() {
        let response = FetchResponse::new(&metadata(), Body::Full(Bytes::new()));
        let http_response = response.into_http().expect("convertible");

        assert_eq!(http_response.status(), http::StatusCode::CREATED);
        assert_eq!(
            http_response.headers().get("content-type").map(|v| v.as_bytes()),
            Some(&b"application/json"[..])
        );
    }
}
