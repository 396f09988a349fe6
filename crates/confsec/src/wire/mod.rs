//! Wire codec
//!
//! Pure functions turning a structured request into the raw HTTP/1.1 bytes the
//! engine's request operation expects, plus request classification that
//! derives routing tags from the request content.

mod headers;
mod request;
mod tags;

pub use headers::Headers;
pub use request::serialize_request;
pub use tags::{classify, merge_tag, INFERENCE_PATHS, NODE_TAGS_HEADER};
