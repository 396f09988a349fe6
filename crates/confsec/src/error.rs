//! Confsec errors

use std::fmt;

use thiserror::Error;

use crate::engine::EngineError;

/// Kind of engine-side object a wrapper owns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Top-level client
    Client,
    /// Response to a single request
    Response,
    /// Chunk stream of a streaming response
    Stream,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Client => write!(f, "client"),
            Resource::Response => write!(f, "response"),
            Resource::Stream => write!(f, "stream"),
        }
    }
}

/// Confsec adapter errors
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration, or configuration rejected by the engine
    #[error("Configuration error: {0}")]
    Config(String),
    /// Operation on a wrapper whose handle was already destroyed
    #[error("{0} not found")]
    NotFound(Resource),
    /// Engine operation failed
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Request could not be normalized
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Response body could not be decoded
    #[error("Invalid body: {0}")]
    InvalidBody(String),
    /// Engine payload was not the expected JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidRequest(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result alias using [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        assert_eq!(
            Error::NotFound(Resource::Client).to_string(),
            "client not found"
        );
        assert_eq!(
            Error::NotFound(Resource::Response).to_string(),
            "response not found"
        );
        assert_eq!(
            Error::NotFound(Resource::Stream).to_string(),
            "stream not found"
        );
    }

    #[test]
    fn test_engine_error_is_verbatim() {
        let error: Error = EngineError::new("invalid api key").into();
        assert_eq!(error.to_string(), "invalid api key");
    }

    #[test]
    fn test_config_display() {
        let error = Error::Config("api key is required".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: api key is required"
        );
    }

    #[test]
    fn test_from_url_parse_error() {
        let result = url::Url::parse("not a url");
        let error: Error = result.expect_err("Invalid URL should fail").into();

        match error {
            Error::InvalidRequest(msg) => assert!(msg.contains("relative URL")),
            _ => panic!("Expected Error::InvalidRequest"),
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let result: Result<serde_json::Value, _> = serde_json::from_str("{");
        let error: Error = result.expect_err("Invalid JSON should fail").into();
        assert!(matches!(error, Error::Serialization(_)));
    }
}
