//! Transport boundary between built requests and the wire.

use async_trait::async_trait;

use crate::config::Config;
use crate::error::BoxError;

/// Sends built request envelopes over the wire.
///
/// The default implementation is [`HttpTransport`]. Tests can swap in
/// [`MockTransport`](crate::mock::MockTransport), and callers can wrap a
/// transport to add middleware behavior around every request.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute the request and return the raw response.
    async fn send(
        &self,
        request: reqwest::Request,
    ) -> std::result::Result<reqwest::Response, BoxError>;
}

/// Default transport backed by a shared `reqwest::Client`.
pub struct HttpTransport {
    inner: reqwest::Client,
}

impl HttpTransport {
    /// Build the transport from client configuration.
    pub fn new(config: &Config) -> Self {
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .gzip(true)
            .brotli(true);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let inner = builder.build().expect("Failed to build HTTP client");
        Self { inner }
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: reqwest::Request,
    ) -> std::result::Result<reqwest::Response, BoxError> {
        Ok(self.inner.execute(request).await?)
    }
}
