//! Client configuration.

use std::time::Duration;

/// Configuration for the REST client.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL prepended to request paths.
    pub base_url: String,
    /// Default Content-Type header, seeded into every request when set.
    pub content_type: String,
    /// Default Authorization header value, seeded into every request when
    /// set.
    pub authorization: String,
    /// Response body size limit in bytes. `None` means unlimited; longer
    /// bodies are truncated at the limit.
    pub response_body_limit: Option<u64>,
    /// Whether request and response bodies appear in trace output.
    pub trace_bodies: bool,
    /// User agent for the default transport.
    pub user_agent: String,
    /// Total per-request timeout for the default transport. `None` means
    /// no timeout.
    pub timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            content_type: String::new(),
            authorization: String::new(),
            response_body_limit: None,
            trace_bodies: true,
            user_agent: format!("restwire/{}", env!("CARGO_PKG_VERSION")),
            timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.base_url.is_empty());
        assert!(config.content_type.is_empty());
        assert!(config.trace_bodies);
        assert!(config.response_body_limit.is_none());
        assert!(config.timeout.is_none());
        assert!(config.user_agent.starts_with("restwire/"));
    }
}
