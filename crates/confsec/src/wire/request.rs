//! Raw HTTP/1.1 request serialization

use std::io::Write;

use url::Url;

use super::Headers;
use crate::error::{Error, Result};

const CRLF: &[u8] = b"\r\n";

/// Serialize a request into the raw HTTP/1.1 layout the engine expects
///
/// Layout: request line, a synthesized `host` header when the caller gave
/// none, caller headers verbatim and in order, a synthesized `content-length`
/// when a body is present and the caller gave none, a blank line, the body.
///
/// Header names must be valid HTTP tokens and values must not contain control
/// characters other than tab, otherwise [`Error::InvalidRequest`] is returned.
pub fn serialize_request(
    method: &str,
    url: &Url,
    headers: &Headers,
    body: Option<&[u8]>,
) -> Result<Vec<u8>> {
    for (name, value) in headers.iter() {
        validate_header(name, value)?;
    }

    let mut target = url.path().to_string();
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }

    let body_len = body.map_or(0, <[u8]>::len);
    let mut raw = Vec::with_capacity(256 + body_len);

    write!(raw, "{method} {target} HTTP/1.1").map_err(write_error)?;
    raw.extend_from_slice(CRLF);

    if !headers.contains("host") {
        write!(raw, "host: {}", host_of(url)?).map_err(write_error)?;
        raw.extend_from_slice(CRLF);
    }

    for (name, value) in headers.iter() {
        write!(raw, "{name}: {value}").map_err(write_error)?;
        raw.extend_from_slice(CRLF);
    }

    if let Some(body) = body {
        if !headers.contains("content-length") {
            write!(raw, "content-length: {}", body.len()).map_err(write_error)?;
            raw.extend_from_slice(CRLF);
        }
    }

    raw.extend_from_slice(CRLF);

    if let Some(body) = body {
        raw.extend_from_slice(body);
    }

    Ok(raw)
}

fn validate_header(name: &str, value: &str) -> Result<()> {
    http::HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| Error::InvalidRequest(format!("invalid header name: {name:?}")))?;
    http::HeaderValue::from_bytes(value.as_bytes())
        .map_err(|_| Error::InvalidRequest(format!("invalid value for header {name}")))?;
    Ok(())
}

fn host_of(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::InvalidRequest(format!("URL has no host: {url}")))?;

    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn write_error(err: std::io::Error) -> Error {
    Error::InvalidRequest(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).expect("valid test URL")
    }

    fn text(raw: Vec<u8>) -> String {
        String::from_utf8(raw).expect("test requests are UTF-8")
    }

    #[test]
    fn test_get_without_body() {
        let raw = serialize_request("GET", &url("https://api.example.com/v1/models"), &Headers::new(), None)
            .expect("serialize");

        assert_eq!(
            text(raw),
            "GET /v1/models HTTP/1.1\r\nhost: api.example.com\r\n\r\n"
        );
    }

    #[test]
    fn test_post_synthesizes_host_and_content_length() {
        let headers = Headers::from([("Content-Type", "application/json")]);
        let body = br#"{"model":"gpt-x"}"#;

        let raw = serialize_request(
            "POST",
            &url("https://api.example.com/v1/completions"),
            &headers,
            Some(body),
        )
        .expect("serialize");

        assert_eq!(
            text(raw),
            "POST /v1/completions HTTP/1.1\r\n\
             host: api.example.com\r\n\
             Content-Type: application/json\r\n\
             content-length: 17\r\n\
             \r\n\
             {\"model\":\"gpt-x\"}"
        );
    }

    #[test]
    fn test_caller_host_and_content_length_are_kept() {
        let headers = Headers::from([
            ("Host", "override.example"),
            ("X-Custom", "a"),
            ("Content-Length", "3"),
        ]);

        let raw = serialize_request("PUT", &url("http://api.example.com/x"), &headers, Some(b"abc"))
            .expect("serialize");

        assert_eq!(
            text(raw),
            "PUT /x HTTP/1.1\r\nHost: override.example\r\nX-Custom: a\r\nContent-Length: 3\r\n\r\nabc"
        );
    }

    #[test]
    fn test_host_includes_non_default_port_and_query() {
        let raw = serialize_request(
            "GET",
            &url("http://localhost:8080/search?q=rust&page=2"),
            &Headers::new(),
            None,
        )
        .expect("serialize");

        assert_eq!(
            text(raw),
            "GET /search?q=rust&page=2 HTTP/1.1\r\nhost: localhost:8080\r\n\r\n"
        );
    }

    #[test]
    fn test_default_port_is_omitted() {
        let raw = serialize_request("GET", &url("https://api.example.com:443/"), &Headers::new(), None)
            .expect("serialize");
        assert!(text(raw).contains("\r\nhost: api.example.com\r\n"));
    }

    #[test]
    fn test_content_length_counts_bytes() {
        let body = "héllo wörld".as_bytes();
        let raw = serialize_request("POST", &url("https://api.example.com/"), &Headers::new(), Some(body))
            .expect("serialize");

        let expected = format!("content-length: {}\r\n", body.len());
        assert!(text(raw).contains(&expected));
        assert_eq!(body.len(), 13);
    }

    #[test]
    fn test_empty_body_still_gets_content_length() {
        let raw = serialize_request("POST", &url("https://api.example.com/"), &Headers::new(), Some(b""))
            .expect("serialize");
        assert!(text(raw).ends_with("content-length: 0\r\n\r\n"));
    }

    #[test]
    fn test_binary_body_is_copied_verbatim() {
        let body = [0u8, 159, 146, 150, b'\r', b'\n'];
        let raw = serialize_request("POST", &url("https://api.example.com/upload"), &Headers::new(), Some(&body))
            .expect("serialize");
        assert!(raw.ends_with(&body));
    }

    #[test]
    fn test_url_without_host_is_rejected() {
        let result = serialize_request("GET", &url("data:text/plain,hello"), &Headers::new(), None);
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    fn serialize_with(name: &str, value: &str) -> Result<Vec<u8>> {
        let headers = Headers::from([(name, value)]);
        serialize_request("POST", &url("https://api.example.com/"), &headers, Some(b"abc"))
    }

    #[test]
    fn test_header_value_with_line_break_is_rejected() {
        for value in ["1\r\nContent-Length: 0\r\n\r\nGET /other HTTP/1.1", "a\nb", "a\rb", "a\0b"] {
            match serialize_with("X-A", value) {
                Err(Error::InvalidRequest(msg)) => assert!(msg.contains("X-A")),
                other => panic!("Expected Error::InvalidRequest, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_invalid_header_name_is_rejected() {
        for name in ["X-A: b", "X A", "", "X-A\r\nX-B", "Bad(Name)"] {
            assert!(
                matches!(serialize_with(name, "1"), Err(Error::InvalidRequest(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_valid_headers_keep_casing_and_tabs() {
        let raw = serialize_with("X-Mixed_Case.Token~1", "tab\tand non-ascii \u{e9}").expect("serialize");
        assert!(text(raw).contains("\r\nX-Mixed_Case.Token~1: tab\tand non-ascii \u{e9}\r\n"));
    }
}
