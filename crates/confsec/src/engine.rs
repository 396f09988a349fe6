//! Engine boundary
//!
//! The routing and crediting engine is reached only through opaque handles.
//! [`Engine`] names every operation the adapter consumes; the wrappers in this
//! crate own the handles and guarantee each one is destroyed exactly once.

use std::fmt;

use thiserror::Error;

use crate::config::ClientConfig;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw engine handle
            pub fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Raw engine handle
            pub fn raw(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

handle!(
    /// Engine-side client
    ClientHandle
);
handle!(
    /// Engine-side response
    ResponseHandle
);
handle!(
    /// Engine-side response chunk stream
    StreamHandle
);

/// Failure reported by an engine operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    /// Create an engine error from its textual message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Engine message
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Operations exposed by the routing and crediting engine
///
/// All operations block the calling thread. Using a handle after its destroy
/// call is undefined on the engine side; callers go through the wrappers,
/// which track closure themselves.
pub trait Engine: Send + Sync + 'static {
    /// Create a client from configuration
    fn client_create(&self, config: &ClientConfig) -> EngineResult<ClientHandle>;

    /// Destroy a client
    fn client_destroy(&self, client: ClientHandle) -> EngineResult<()>;

    /// Credits charged per request by default
    fn client_default_credit_amount_per_request(&self, client: ClientHandle)
        -> EngineResult<i64>;

    /// Maximum number of candidate nodes considered per request
    fn client_max_candidate_nodes(&self, client: ClientHandle) -> EngineResult<u32>;

    /// Node tags applied to every request
    fn client_default_node_tags(&self, client: ClientHandle) -> EngineResult<Vec<String>>;

    /// Replace the node tags applied to every request
    fn client_set_default_node_tags(
        &self,
        client: ClientHandle,
        tags: &[String],
    ) -> EngineResult<()>;

    /// Wallet status as a JSON document
    fn client_wallet_status(&self, client: ClientHandle) -> EngineResult<String>;

    /// Issue a raw HTTP/1.1 request
    fn client_do_request(&self, client: ClientHandle, request: &[u8])
        -> EngineResult<ResponseHandle>;

    /// Destroy a response
    fn response_destroy(&self, response: ResponseHandle) -> EngineResult<()>;

    /// Response metadata as a JSON document
    fn response_metadata(&self, response: ResponseHandle) -> EngineResult<Vec<u8>>;

    /// Whether the response body is delivered as a chunk stream
    fn response_is_streaming(&self, response: ResponseHandle) -> EngineResult<bool>;

    /// Full response body
    fn response_body(&self, response: ResponseHandle) -> EngineResult<Vec<u8>>;

    /// Open the chunk stream of a streaming response
    fn response_stream(&self, response: ResponseHandle) -> EngineResult<StreamHandle>;

    /// Next chunk, or `None` at end of stream
    fn stream_next(&self, stream: StreamHandle) -> EngineResult<Option<Vec<u8>>>;

    /// Destroy a chunk stream
    fn stream_destroy(&self, stream: StreamHandle) -> EngineResult<()>;
}
