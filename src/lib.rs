//! # restwire
//!
//! A configurable REST client: typed request and response bodies, a
//! pluggable transport, token caching with single-flight refresh, and
//! typed error-body decoding.
//!
//! ## Features
//!
//! - **Typed bodies**: JSON and XML (un)marshaling driven by content type
//! - **Error decoding**: failed responses decode into a declared error type
//! - **Token cache**: bearer tokens refresh once under concurrency
//! - **Streaming**: response bodies can be handed over as a live stream
//! - **Overridable**: the transport, codecs, success check and the whole
//!   call can be replaced per client or per request
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use restwire::Client;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Default, Deserialize)]
//! struct Todo {
//!     title: String,
//!     completed: bool,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new().with_base_url("https://jsonplaceholder.typicode.com");
//!
//!     let mut todo = Todo::default();
//!     client
//!         .request()
//!         .response_body(&mut todo)
//!         .path_params(["id", "1"])
//!         .get("/todos/{id}")
//!         .await?;
//!
//!     println!("{todo:?}");
//!     Ok(())
//! }
//! ```

mod body;
mod client;
mod config;
mod error;
mod oauth;
mod overridable;
mod path;
mod request;
mod response;
mod token;
mod trace;
mod transport;

pub mod mock;

pub use body::{
    Body, BodyStream, DecodeTarget, Encodable, ErrorDecodeTarget, is_json_content_type,
    is_xml_content_type,
};
pub use client::Client;
pub use config::Config;
pub use error::{BoxError, Error, Result};
pub use oauth::{OAuthConfig, OAuthProvider, OAuthToken};
pub use overridable::{ExecuteFn, IsSuccessFn, MarshalFn, Overridables, UnmarshalFn, defaults};
pub use path::expand_path;
pub use request::Request;
pub use response::Response;
pub use token::{Token, TokenCache, TokenProvider};
pub use trace::{NopTraceHook, SpanTraceHook, TraceHook, TraceSpan};
pub use transport::{HttpTransport, Transport};

// Re-export common types
pub use bytes::Bytes;
pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
pub use url::Url;

/// Prelude with the commonly used types.
///
/// ```rust
/// use restwire::prelude::*;
/// ```
pub mod prelude {
    pub use crate::body::{Body, BodyStream, DecodeTarget, Encodable};
    pub use crate::client::Client;
    pub use crate::config::Config;
    pub use crate::error::{BoxError, Error, Result};
    pub use crate::oauth::OAuthConfig;
    pub use crate::overridable::Overridables;
    pub use crate::request::Request;
    pub use crate::response::Response;
    pub use crate::token::{Token, TokenProvider};
    pub use crate::trace::{TraceHook, TraceSpan};
    pub use crate::transport::Transport;

    pub use http::{Method, StatusCode};
}
