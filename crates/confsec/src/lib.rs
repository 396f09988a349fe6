//! Confsec fetch adapter
//!
//! Routes HTTP requests through the confsec compute-selection and crediting
//! engine while exposing a plain fetch-style interface. The engine is reached
//! through opaque handles (see [`Engine`]); this crate owns those handles,
//! destroys each one exactly once, serializes requests into the raw HTTP/1.1
//! bytes the engine expects and tags inference requests with the model they
//! target.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use confsec::{ClientConfig, ConfsecClient, Engine, FetchRequest, RequestInit};
//!
//! async fn example<E: Engine>(engine: Arc<E>) -> confsec::Result<String> {
//!     let client = ConfsecClient::new(engine, ClientConfig::new("api-key"))?;
//!
//!     let request = FetchRequest::post("https://api.example.com/v1/completions")?
//!         .header("Content-Type", "application/json")
//!         .body(r#"{"model":"llama-3","prompt":"hello"}"#);
//!
//!     let response = client.fetch(request, RequestInit::new()).await?;
//!     let text = response.text().await?;
//!
//!     client.close()?;
//!     Ok(text)
//! }
//! ```

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
#[cfg(feature = "libconfsec")]
pub mod ffi;
pub mod guard;
pub mod logging;
pub mod response;
pub mod stream;
pub mod wire;

pub use client::{ConfsecClient, WalletStatus};
pub use config::{ClientConfig, IdentityPolicy};
pub use engine::{
    ClientHandle, Engine, EngineError, EngineResult, ResponseHandle, StreamHandle,
};
pub use error::{Error, Resource, Result};
pub use fetch::{
    fetch, Body, BodyStream, FetchRequest, FetchResponse, RequestBody, RequestInit, RequestInput,
};
pub use guard::CloseGuard;
pub use logging::{init_default_logging, init_logging};
pub use response::{HeaderEntry, Response, ResponseMetadata};
pub use stream::ResponseStream;
pub use wire::Headers;
