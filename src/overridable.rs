//! Overridable behavior carried by every client and request.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::body::{DecodeTarget, Encodable};
use crate::error::{BoxError, Result};
use crate::request::Request;
use crate::transport::Transport;

/// Success predicate over an executed request.
pub type IsSuccessFn = Arc<dyn Fn(&Request<'_>) -> bool + Send + Sync>;

/// Marshal function for structured request bodies.
pub type MarshalFn = Arc<
    dyn Fn(&Request<'_>, &dyn Encodable) -> std::result::Result<Vec<u8>, BoxError> + Send + Sync,
>;

/// Unmarshal function for response bodies.
pub type UnmarshalFn = Arc<
    dyn Fn(&Request<'_>, &[u8], &mut dyn DecodeTarget) -> std::result::Result<(), BoxError>
        + Send
        + Sync,
>;

/// End-to-end execution function, the seam for retries and request mocks.
pub type ExecuteFn =
    Arc<dyn for<'r, 'c> Fn(&'r mut Request<'c>) -> BoxFuture<'r, Result<()>> + Send + Sync>;

/// The replaceable functions a client consults while executing a request.
///
/// Every request carries its own copy, so behavior can be swapped per
/// client or per request. All fields are preset with the [`defaults`].
#[derive(Clone)]
pub struct Overridables {
    /// Transport invoked with the built request envelope.
    pub transport: Arc<dyn Transport>,
    /// Success check, consulted once the response status is known.
    pub is_success: IsSuccessFn,
    /// JSON marshal function for request bodies.
    pub json_marshal: MarshalFn,
    /// JSON unmarshal function for response bodies.
    pub json_unmarshal: UnmarshalFn,
    /// XML marshal function for request bodies.
    pub xml_marshal: MarshalFn,
    /// XML unmarshal function for response bodies.
    pub xml_unmarshal: UnmarshalFn,
    /// Whole-call execution, wrapping build, transport and processing.
    pub execute: ExecuteFn,
}

impl Overridables {
    /// Create the default function set around the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            is_success: Arc::new(defaults::is_success),
            json_marshal: Arc::new(defaults::json_marshal),
            json_unmarshal: Arc::new(defaults::json_unmarshal),
            xml_marshal: Arc::new(defaults::xml_marshal),
            xml_unmarshal: Arc::new(defaults::xml_unmarshal),
            execute: Arc::new(defaults::execute_boxed),
        }
    }
}

pub mod defaults {
    //! Default implementations of the overridable functions.

    use super::*;

    /// Default success check.
    ///
    /// A request with an explicit success-status set succeeds exactly when
    /// the status is in that set. Otherwise any 2xx status counts as
    /// success. A request without a response never counts as success.
    pub fn is_success(req: &Request<'_>) -> bool {
        let Some(status) = req.response().status() else {
            return false;
        };
        let code = status.as_u16();
        let explicit = req.response().success_statuses();
        if !explicit.is_empty() {
            return explicit.contains(&code);
        }
        (200..300).contains(&code)
    }

    /// Default JSON marshal, backed by `serde_json`.
    pub fn json_marshal(
        _req: &Request<'_>,
        body: &dyn Encodable,
    ) -> std::result::Result<Vec<u8>, BoxError> {
        body.encode_json()
    }

    /// Default JSON unmarshal, backed by `serde_json`.
    pub fn json_unmarshal(
        _req: &Request<'_>,
        data: &[u8],
        dest: &mut dyn DecodeTarget,
    ) -> std::result::Result<(), BoxError> {
        dest.put_json(data)
    }

    /// Default XML marshal, backed by `quick-xml`.
    pub fn xml_marshal(
        _req: &Request<'_>,
        body: &dyn Encodable,
    ) -> std::result::Result<Vec<u8>, BoxError> {
        body.encode_xml()
    }

    /// Default XML unmarshal, backed by `quick-xml`.
    pub fn xml_unmarshal(
        _req: &Request<'_>,
        data: &[u8],
        dest: &mut dyn DecodeTarget,
    ) -> std::result::Result<(), BoxError> {
        dest.put_xml(data)
    }

    /// Default end-to-end execution: build the envelope, trace, send it
    /// through the transport and process the response.
    pub async fn execute(req: &mut Request<'_>) -> Result<()> {
        crate::request::execute_parts(req).await
    }

    pub(crate) fn execute_boxed<'r, 'c>(req: &'r mut Request<'c>) -> BoxFuture<'r, Result<()>> {
        Box::pin(execute(req))
    }
}
