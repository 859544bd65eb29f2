//! Test doubles: a canned-response transport and a whole-call mock.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use restwire::Client;
//! use restwire::mock::{MockResponse, MockTransport};
//!
//! # tokio_test::block_on(async {
//! let transport = Arc::new(MockTransport::with_response(MockResponse::json(
//!     200,
//!     r#"{"id": 7}"#,
//! )));
//! let client = Client::new_with_transport(transport.clone());
//!
//! let mut order = serde_json::Value::Null;
//! let mut req = client.request().response_body(&mut order);
//! req.get("http://svc.local/orders/7").await.unwrap();
//! drop(req);
//!
//! assert_eq!(order["id"], 7);
//! assert_eq!(transport.last_request().unwrap().url, "http://svc.local/orders/7");
//! # });
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use http::Method;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{BoxError, Error, Result};
use crate::overridable::ExecuteFn;
use crate::request::Request;
use crate::transport::Transport;

/// Canned response served by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    body: Vec<u8>,
    content_type: String,
    headers: Vec<(String, String)>,
}

impl MockResponse {
    /// Create an empty response with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            content_type: String::new(),
            headers: Vec::new(),
        }
    }

    /// Create a JSON response.
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self::new(status)
            .body(body.into().into_bytes())
            .content_type("application/json")
    }

    /// Create an XML response.
    pub fn xml(status: u16, body: impl Into<String>) -> Self {
        Self::new(status)
            .body(body.into().into_bytes())
            .content_type("text/xml")
    }

    /// Set the response body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the response content type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Add a response header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A request captured by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    /// Request method.
    pub method: Method,
    /// Full request URL.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Request body bytes, empty for streamed payloads.
    pub body: Vec<u8>,
}

/// Transport double that serves canned responses and records every request.
///
/// Without further setup every request is answered with an empty 200.
/// Queued responses are served first, in order, then the template response
/// when one is set.
#[derive(Default)]
pub struct MockTransport {
    template: Mutex<Option<MockResponse>>,
    queue: Mutex<VecDeque<MockResponse>>,
    failure: Mutex<Option<String>>,
    captured: Mutex<Vec<CapturedRequest>>,
}

impl MockTransport {
    /// Create a transport answering every request with an empty 200.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport serving `response` for every request.
    pub fn with_response(response: MockResponse) -> Self {
        let transport = Self::default();
        *transport.template.lock() = Some(response);
        transport
    }

    /// Create a transport failing every request with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        let transport = Self::default();
        *transport.failure.lock() = Some(message.into());
        transport
    }

    /// Queue a one-shot response, served before the template.
    pub fn enqueue(&self, response: MockResponse) {
        self.queue.lock().push_back(response);
    }

    /// All captured requests, in execution order.
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.captured.lock().clone()
    }

    /// Number of requests this transport has seen.
    pub fn request_count(&self) -> usize {
        self.captured.lock().len()
    }

    /// The most recent captured request.
    pub fn last_request(&self) -> Option<CapturedRequest> {
        self.captured.lock().last().cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        request: reqwest::Request,
    ) -> std::result::Result<reqwest::Response, BoxError> {
        let headers = request
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = request
            .body()
            .and_then(reqwest::Body::as_bytes)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();
        self.captured.lock().push(CapturedRequest {
            method: request.method().clone(),
            url: request.url().to_string(),
            headers,
            body,
        });

        if let Some(message) = self.failure.lock().clone() {
            return Err(message.into());
        }

        let mock = self
            .queue
            .lock()
            .pop_front()
            .or_else(|| self.template.lock().clone())
            .unwrap_or_else(|| MockResponse::new(200));

        let mut builder = http::Response::builder().status(mock.status);
        if !mock.content_type.is_empty() {
            builder = builder.header(http::header::CONTENT_TYPE, mock.content_type.as_str());
        }
        for (name, value) in &mock.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.body(mock.body)?;
        Ok(reqwest::Response::from(response))
    }
}

/// Build an execution override that skips the wire entirely and writes
/// `value` into the structured response destination of every request.
pub fn mock_execute<T>(value: T) -> ExecuteFn
where
    T: Serialize + Send + Sync + 'static,
{
    let payload = Arc::new(value);
    Arc::new(move |req: &mut Request<'_>| {
        let payload = payload.clone();
        let fut: BoxFuture<'_, Result<()>> = Box::pin(async move {
            let data = serde_json::to_vec(payload.as_ref())
                .map_err(|source| Error::Marshal {
                    source: Box::new(source),
                })?;
            req.put_mock_response(&data)
        });
        fut
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_serves_queue_then_template() {
        let transport = MockTransport::with_response(MockResponse::new(200));
        transport.enqueue(MockResponse::json(201, r#"{"id": 1}"#));

        let first = transport
            .send(reqwest::Request::new(
                Method::GET,
                "http://example.com/a".parse().unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(first.status().as_u16(), 201);

        let second = transport
            .send(reqwest::Request::new(
                Method::GET,
                "http://example.com/b".parse().unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(second.status().as_u16(), 200);

        assert_eq!(transport.request_count(), 2);
        assert_eq!(transport.requests()[0].url, "http://example.com/a");
    }

    #[tokio::test]
    async fn test_mock_transport_failure() {
        let transport = MockTransport::failing("boom");
        let err = transport
            .send(reqwest::Request::new(
                Method::GET,
                "http://example.com/a".parse().unwrap(),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_response_headers() {
        let transport = MockTransport::with_response(
            MockResponse::new(200).header("X-Request-Id", "seven"),
        );
        let response = transport
            .send(reqwest::Request::new(
                Method::GET,
                "http://example.com/a".parse().unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.headers().get("X-Request-Id").unwrap(), "seven");
    }
}
