//! Configurable REST client.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::body::{ErrorCapture, ErrorDecodeTarget};
use crate::config::Config;
use crate::oauth::{OAuthConfig, OAuthProvider};
use crate::overridable::Overridables;
use crate::request::{Request, encode_basic_auth};
use crate::token::{TokenCache, TokenProvider};
use crate::trace::TraceHook;
use crate::transport::{HttpTransport, Transport};

/// Factory building a fresh error decode destination per failed response.
pub(crate) type ErrorShapeFn = Arc<dyn Fn() -> Box<dyn ErrorDecodeTarget> + Send + Sync>;

/// REST client holding shared configuration and defaults for requests.
///
/// A client is set up once with the chainable `with_*` methods and can then
/// be cloned freely; clones share the transport and the token cache.
/// Executing requests never mutates client state, so any number of requests
/// can be in flight at once.
#[derive(Clone)]
pub struct Client {
    config: Config,
    overridables: Overridables,
    token_provider: Option<Arc<dyn TokenProvider>>,
    error_shape: Option<ErrorShapeFn>,
    trace_hook: Option<Arc<dyn TraceHook>>,
    token_cache: Arc<TokenCache>,
}

impl Client {
    /// Create a client without a request timeout.
    pub fn new() -> Self {
        Self::new_with_config(Config::default())
    }

    /// Create a client whose default transport enforces a total per-request
    /// timeout.
    pub fn new_with_timeout(timeout: Duration) -> Self {
        Self::new_with_config(Config {
            timeout: Some(timeout),
            ..Config::default()
        })
    }

    /// Create a client from full configuration.
    pub fn new_with_config(config: Config) -> Self {
        let transport = Arc::new(HttpTransport::new(&config));
        Self::assemble(config, transport)
    }

    /// Create a client around a custom transport.
    pub fn new_with_transport(transport: Arc<dyn Transport>) -> Self {
        Self::assemble(Config::default(), transport)
    }

    fn assemble(config: Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            overridables: Overridables::new(transport),
            token_provider: None,
            error_shape: None,
            trace_hook: None,
            token_cache: Arc::new(TokenCache::new()),
        }
    }

    /// Set the base URL prepended to request paths.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Set the default Content-Type header for requests.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.config.content_type = content_type.into();
        self
    }

    /// Default requests to `application/json`.
    pub fn with_content_type_json(self) -> Self {
        self.with_content_type("application/json")
    }

    /// Default requests to `text/xml`.
    pub fn with_content_type_xml(self) -> Self {
        self.with_content_type("text/xml")
    }

    /// Set a raw default Authorization header value for requests.
    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.config.authorization = value.into();
        self
    }

    /// Default requests to basic authentication.
    pub fn with_basic_auth(self, username: &str, password: &str) -> Self {
        let encoded = encode_basic_auth(username, password);
        self.with_authorization(format!("Basic {encoded}"))
    }

    /// Default requests to bearer authentication with a fixed token.
    ///
    /// The token must not carry the `Bearer ` prefix.
    pub fn with_bearer_auth(self, token: impl Into<String>) -> Self {
        self.with_authorization(format!("Bearer {}", token.into()))
    }

    /// Install a token provider. Every request except token requests gets a
    /// bearer token from it through the shared token cache.
    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Install the OAuth client-credentials token provider. Token requests
    /// run over the same transport as regular requests.
    pub fn with_oauth(self, config: OAuthConfig) -> Self {
        let transport = self.overridables.transport.clone();
        self.with_token_provider(Arc::new(OAuthProvider::new(config, transport)))
    }

    /// Declare the type error bodies decode into when a response fails the
    /// success check and the request has no error destination of its own.
    ///
    /// The decoded value becomes the source of the returned status error
    /// and can be recovered with
    /// [`Error::api_error`](crate::Error::api_error).
    pub fn with_error_type<E>(mut self) -> Self
    where
        E: StdError + DeserializeOwned + Send + Sync + 'static,
    {
        self.error_shape = Some(Arc::new(|| {
            Box::new(ErrorCapture::<E>::new()) as Box<dyn ErrorDecodeTarget>
        }));
        self
    }

    /// Limit response bodies to `limit` bytes. Longer bodies are truncated
    /// at the limit.
    pub fn with_response_body_limit(mut self, limit: Option<u64>) -> Self {
        self.config.response_body_limit = limit;
        self
    }

    /// Include or exclude request and response bodies from trace output.
    pub fn with_trace_bodies(mut self, enabled: bool) -> Self {
        self.config.trace_bodies = enabled;
        self
    }

    /// Install a trace hook observing every executed request.
    pub fn with_trace_hook(mut self, hook: Arc<dyn TraceHook>) -> Self {
        self.trace_hook = Some(hook);
        self
    }

    /// Get the client configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the overridable function set.
    pub fn overridables(&self) -> &Overridables {
        &self.overridables
    }

    /// Mutable access to the overridable function set.
    pub fn overridables_mut(&mut self) -> &mut Overridables {
        &mut self.overridables
    }

    /// Get the token cache shared by all clones of this client.
    pub fn token_cache(&self) -> &TokenCache {
        &self.token_cache
    }

    /// Create a request inheriting the client defaults.
    pub fn request(&self) -> Request<'_> {
        Request::new(self)
    }

    pub(crate) fn token_provider(&self) -> Option<&Arc<dyn TokenProvider>> {
        self.token_provider.as_ref()
    }

    pub(crate) fn error_shape(&self) -> Option<&ErrorShapeFn> {
        self.error_shape.as_ref()
    }

    pub(crate) fn trace_hook(&self) -> Option<&Arc<dyn TraceHook>> {
        self.trace_hook.as_ref()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = Client::new();
        assert!(client.config().base_url.is_empty());
        assert!(client.config().trace_bodies);
    }

    #[test]
    fn test_client_with_timeout() {
        let client = Client::new_with_timeout(Duration::from_secs(5));
        assert_eq!(client.config().timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_client_fluent_setup() {
        let client = Client::new()
            .with_base_url("http://example.com")
            .with_content_type_json()
            .with_bearer_auth("abc")
            .with_response_body_limit(Some(1024))
            .with_trace_bodies(false);

        assert_eq!(client.config().base_url, "http://example.com");
        assert_eq!(client.config().content_type, "application/json");
        assert_eq!(client.config().authorization, "Bearer abc");
        assert_eq!(client.config().response_body_limit, Some(1024));
        assert!(!client.config().trace_bodies);
    }

    #[test]
    fn test_client_basic_auth() {
        let client = Client::new().with_basic_auth("user", "pass");
        // base64("user:pass")
        assert_eq!(client.config().authorization, "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_clones_share_token_cache() {
        let client = Client::new();
        let clone = client.clone();
        assert!(Arc::ptr_eq(&client.token_cache, &clone.token_cache));
    }

    #[test]
    fn test_request_inherits_defaults() {
        let client = Client::new()
            .with_content_type_json()
            .with_authorization("Bearer xyz");
        let req = client.request();

        assert_eq!(req.header_value("Content-Type"), Some("application/json"));
        assert_eq!(req.header_value("Authorization"), Some("Bearer xyz"));
    }
}
