//! Fetch adapter
//!
//! Accepts requests in the familiar two-argument fetch shape, routes them
//! through a [`ConfsecClient`] and hands back a [`FetchResponse`]. Streaming
//! responses are exposed as a live [`BodyStream`] that owns the engine
//! handles until it ends or is dropped.

mod body;
mod response;

use bytes::Bytes;
use http::Method;
use url::Url;

pub use self::body::{Body, BodyStream, BoxError, RequestBody};
pub use self::response::FetchResponse;
use crate::client::ConfsecClient;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::wire::{classify, merge_tag, serialize_request, Headers, NODE_TAGS_HEADER};

/// Structured request
#[derive(Debug)]
pub struct FetchRequest {
    method: Method,
    url: Url,
    headers: Headers,
    body: Option<RequestBody>,
}

impl FetchRequest {
    /// Request with no headers and no body
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: None,
        }
    }

    /// GET request for `url`
    pub fn get(url: &str) -> Result<Self> {
        Ok(Self::new(Method::GET, Url::parse(url)?))
    }

    /// POST request for `url`
    pub fn post(url: &str) -> Result<Self> {
        Ok(Self::new(Method::POST, Url::parse(url)?))
    }

    /// Append a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the body
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a JSON body and its content type
    pub fn json<T: serde::Serialize>(mut self, body: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(body)?;
        self.headers.set("content-type", "application/json");
        self.body = Some(encoded.into());
        Ok(self)
    }

    /// Request method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }
}

impl<B> TryFrom<http::Request<B>> for FetchRequest
where
    B: Into<Bytes>,
{
    type Error = Error;

    fn try_from(request: http::Request<B>) -> Result<Self> {
        let (parts, body) = request.into_parts();
        let url = Url::parse(&parts.uri.to_string())?;

        let mut headers = Headers::new();
        for (name, value) in parts.headers.iter() {
            let value = value
                .to_str()
                .map_err(|err| Error::InvalidRequest(format!("header {name}: {err}")))?;
            headers.append(name.as_str(), value);
        }

        let body: Bytes = body.into();
        Ok(Self {
            method: parts.method,
            url,
            headers,
            body: (!body.is_empty()).then_some(RequestBody::Bytes(body)),
        })
    }
}

/// First argument of [`fetch`]: a URL or a complete request
#[derive(Debug)]
pub enum RequestInput {
    /// URL to be parsed
    Str(String),
    /// Parsed URL
    Url(Url),
    /// Complete request
    Request(FetchRequest),
}

impl From<&str> for RequestInput {
    fn from(url: &str) -> Self {
        RequestInput::Str(url.to_string())
    }
}

impl From<String> for RequestInput {
    fn from(url: String) -> Self {
        RequestInput::Str(url)
    }
}

impl From<Url> for RequestInput {
    fn from(url: Url) -> Self {
        RequestInput::Url(url)
    }
}

impl From<FetchRequest> for RequestInput {
    fn from(request: FetchRequest) -> Self {
        RequestInput::Request(request)
    }
}

/// Second argument of [`fetch`]: overrides applied on top of the input
#[derive(Debug, Default)]
pub struct RequestInit {
    /// Replaces the method
    pub method: Option<Method>,
    /// Replaces the whole header list
    pub headers: Option<Headers>,
    /// Replaces the body
    pub body: Option<RequestBody>,
}

impl RequestInit {
    /// No overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the method
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Override the headers
    pub fn headers(mut self, headers: impl Into<Headers>) -> Self {
        self.headers = Some(headers.into());
        self
    }

    /// Override the body
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }
}

struct PreparedRequest {
    method: Method,
    url: Url,
    headers: Headers,
    body: Option<Bytes>,
}

async fn prepare(input: RequestInput, init: RequestInit) -> Result<PreparedRequest> {
    let mut request = match input {
        RequestInput::Str(url) => FetchRequest::new(Method::GET, Url::parse(&url)?),
        RequestInput::Url(url) => FetchRequest::new(Method::GET, url),
        RequestInput::Request(request) => request,
    };

    if let Some(method) = init.method {
        request.method = method;
    }
    if let Some(headers) = init.headers {
        request.headers = headers;
    }
    if let Some(body) = init.body {
        request.body = Some(body);
    }

    if request.body.is_some() && matches!(request.method, Method::GET | Method::HEAD) {
        return Err(Error::InvalidRequest(format!(
            "{} request cannot have a body",
            request.method
        )));
    }

    let body = match request.body {
        Some(body) => Some(body.into_bytes().await?),
        None => None,
    };

    Ok(PreparedRequest {
        method: request.method,
        url: request.url,
        headers: request.headers,
        body,
    })
}

fn tag_request(request: &mut PreparedRequest) {
    let Some(tag) = classify(request.url.path(), request.body.as_deref()) else {
        return;
    };

    let existing = request.headers.get(NODE_TAGS_HEADER);
    let merged = merge_tag(existing, &tag);
    if existing != Some(merged.as_str()) {
        tracing::debug!("Tagging request to {} with {}", request.url.path(), merged);
        request.headers.set(NODE_TAGS_HEADER, merged);
    }
}

/// Issue a request through the engine
///
/// The request body is buffered, tagged with the model it targets when the
/// path is a known inference endpoint, serialized and sent. Non-streaming
/// responses are read in full and released before returning; streaming
/// responses keep their handles until the returned body stream ends or is
/// dropped.
pub async fn fetch<E: Engine>(
    client: &ConfsecClient<E>,
    input: impl Into<RequestInput>,
    init: RequestInit,
) -> Result<FetchResponse> {
    let mut request = prepare(input.into(), init).await?;
    tag_request(&mut request);

    let raw = serialize_request(
        request.method.as_str(),
        &request.url,
        &request.headers,
        request.body.as_deref(),
    )?;

    tracing::debug!("{} {} ({} bytes)", request.method, request.url, raw.len());

    let response = client.do_request(&raw)?;
    let metadata = response.metadata()?.clone();

    if !response.is_streaming()? {
        let body = response.body()?;
        response.close()?;
        return Ok(FetchResponse::new(&metadata, Body::Full(body)));
    }

    let stream = response.into_stream()?;
    Ok(FetchResponse::new(
        &metadata,
        Body::Stream(BodyStream::from_response_stream(stream)),
    ))
}

impl<E: Engine> ConfsecClient<E> {
    /// Issue a request through this client, see [`fetch`]
    pub async fn fetch(
        &self,
        input: impl Into<RequestInput>,
        init: RequestInit,
    ) -> Result<FetchResponse> {
        fetch(self, input, init).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prepare_applies_init_overrides() {
        let request = FetchRequest::get("https://api.example.com/v1/completions")
            .expect("valid URL")
            .header("X-Old", "1");

        let prepared = prepare(
            request.into(),
            RequestInit::new()
                .method(Method::POST)
                .headers([("X-New", "2")])
                .body("payload"),
        )
        .await
        .expect("prepare");

        assert_eq!(prepared.method, Method::POST);
        assert_eq!(prepared.headers.iter().collect::<Vec<_>>(), vec![("X-New", "2")]);
        assert_eq!(prepared.body.as_deref(), Some(&b"payload"[..]));
    }

    #[tokio::test]
    async fn test_prepare_buffers_stream_body() {
        let chunks = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"{\"model\":")),
            Ok(Bytes::from_static(b"\"gpt-x\"}")),
        ]);

        let prepared = prepare(
            "https://api.example.com/v1/completions".into(),
            RequestInit::new()
                .method(Method::POST)
                .body(RequestBody::from_stream(chunks)),
        )
        .await
        .expect("prepare");

        assert_eq!(prepared.body.as_deref(), Some(&br#"{"model":"gpt-x"}"#[..]));
    }

    #[tokio::test]
    async fn test_prepare_stream_body_error() {
        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("connection reset")),
        ]);

        let result = prepare(
            "https://api.example.com/upload".into(),
            RequestInit::new()
                .method(Method::POST)
                .body(RequestBody::from_stream(chunks)),
        )
        .await;

        match result {
            Err(Error::InvalidRequest(msg)) => assert!(msg.contains("connection reset")),
            _ => panic!("Expected Error::InvalidRequest"),
        }
    }

    #[tokio::test]
    async fn test_prepare_rejects_get_with_body() {
        let result = prepare(
            "https://api.example.com/".into(),
            RequestInit::new().body("nope"),
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_prepare_rejects_bad_url() {
        let result = prepare("not a url".into(), RequestInit::new()).await;
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_tag_request_appends_after_caller_tags() {
        let mut prepared = prepare(
            FetchRequest::post("https://api.example.com/v1/completions")
                .expect("valid URL")
                .header("X-Confsec-Node-Tags", "foo=bar")
                .body(r#"{"model":"gpt-x"}"#)
                .into(),
            RequestInit::new(),
        )
        .await
        .expect("prepare");

        tag_request(&mut prepared);

        assert_eq!(
            prepared.headers.iter().collect::<Vec<_>>(),
            vec![("X-Confsec-Node-Tags", "foo=bar,model=gpt-x")]
        );
    }

    #[tokio::test]
    async fn test_tag_request_ignores_other_paths() {
        let mut prepared = prepare(
            FetchRequest::post("https://api.example.com/v1/embeddings")
                .expect("valid URL")
                .body(r#"{"model":"gpt-x"}"#)
                .into(),
            RequestInit::new(),
        )
        .await
        .expect("prepare");

        tag_request(&mut prepared);
        assert!(!prepared.headers.contains(NODE_TAGS_HEADER));
    }

    #[test]
    fn test_from_http_request() {
        let request = http::Request::builder()
            .method("POST")
            .uri("https://api.example.com/v1/chat/completions")
            .header("content-type", "application/json")
            .body(Bytes::from_static(br#"{"model":"llama"}"#))
            .expect("valid http request");

        let request = FetchRequest::try_from(request).expect("convertible");
        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.url().path(), "/v1/chat/completions");
        assert_eq!(request.headers().get("Content-Type"), Some("application/json"));
    }
}
