//! OAuth client-credentials token provider.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::token::{Token, TokenProvider};
use crate::transport::Transport;

/// Tokens count as stale this long before their reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Fallback lifetime when the reported expiry overflows the clock.
const MAX_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Configuration for the OAuth client-credentials grant.
#[derive(Debug, Clone, Default)]
pub struct OAuthConfig {
    /// Token endpoint URL.
    pub url: String,
    /// Grant type, usually `client_credentials`.
    pub grant_type: String,
    /// Requested scope.
    pub scope: String,
    /// Client identifier.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
}

/// Bearer token issued by an OAuth token endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthToken {
    /// The access token value.
    #[serde(default)]
    pub access_token: String,
    /// Token type reported by the endpoint, usually `Bearer`.
    #[serde(default)]
    pub token_type: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: u64,
    /// Extended lifetime in seconds, reported by some identity providers.
    #[serde(default)]
    pub ext_expires_in: u64,
    /// Instant after which the token counts as stale, margin included.
    #[serde(skip)]
    pub valid_until: Option<Instant>,
}

impl OAuthToken {
    fn with_validity(mut self) -> Self {
        let now = Instant::now();
        let expiry = now
            .checked_add(Duration::from_secs(self.expires_in))
            .or_else(|| now.checked_add(MAX_LIFETIME))
            .unwrap_or(now);
        self.valid_until = Some(expiry.checked_sub(EXPIRY_MARGIN).unwrap_or(now));
        self
    }
}

impl Token for OAuthToken {
    fn value(&self) -> &str {
        &self.access_token
    }

    fn needs_refresh(&self) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        self.valid_until
            .is_none_or(|valid_until| Instant::now() >= valid_until)
    }
}

/// Token provider implementing the OAuth client-credentials grant.
///
/// Token requests run over a dedicated bare client that shares the parent
/// transport, so they use the same wire configuration but none of the
/// parent's defaults.
pub struct OAuthProvider {
    config: OAuthConfig,
    client: Client,
}

impl OAuthProvider {
    /// Create a provider posting grants through the given transport.
    pub fn new(config: OAuthConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            client: Client::new_with_transport(transport),
        }
    }
}

#[async_trait]
impl TokenProvider for OAuthProvider {
    async fn get_token(&self, _previous: Option<Arc<dyn Token>>) -> Result<Arc<dyn Token>> {
        let grant = serde_urlencoded::to_string([
            ("grant_type", self.config.grant_type.as_str()),
            ("scope", self.config.scope.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ])
        .map_err(|e| Error::InvalidRequest(format!("failed to encode oauth grant: {e}")))?;

        let mut token = OAuthToken::default();
        let mut req = self
            .client
            .request()
            .base_url(self.config.url.clone())
            .content_type("application/x-www-form-urlencoded")
            .body_text(grant)
            .token_request()
            .response_body(&mut token);
        let result = req.post("").await;
        drop(req);
        result.map_err(|e| Error::OAuthToken(Box::new(e)))?;

        Ok(Arc::new(token.with_validity()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_without_value_needs_refresh() {
        let token = OAuthToken::default();
        assert!(token.needs_refresh());
    }

    #[test]
    fn test_token_within_margin_needs_refresh() {
        let token = OAuthToken {
            access_token: "abc".to_string(),
            expires_in: 60,
            ..OAuthToken::default()
        }
        .with_validity();
        // 60s lifetime sits entirely inside the 5 minute margin.
        assert!(token.needs_refresh());
    }

    #[test]
    fn test_overflowing_lifetime_saturates() {
        let token = OAuthToken {
            access_token: "abc".to_string(),
            expires_in: u64::MAX,
            ..OAuthToken::default()
        }
        .with_validity();
        assert!(!token.needs_refresh());
    }

    #[test]
    fn test_token_outside_margin_is_fresh() {
        let token = OAuthToken {
            access_token: "abc".to_string(),
            expires_in: 3600,
            ..OAuthToken::default()
        }
        .with_validity();
        assert!(!token.needs_refresh());
        assert_eq!(token.value(), "abc");
    }

    #[test]
    fn test_grant_encoding() {
        let encoded = serde_urlencoded::to_string([
            ("grant_type", "client_credentials"),
            ("scope", "api read"),
            ("client_id", "id"),
            ("client_secret", "s&cret"),
        ])
        .unwrap();
        assert_eq!(
            encoded,
            "grant_type=client_credentials&scope=api+read&client_id=id&client_secret=s%26cret"
        );
    }
}
