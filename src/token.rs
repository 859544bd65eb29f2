//! Bearer token acquisition and caching.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;

/// A bearer token with its own staleness rule.
pub trait Token: Send + Sync {
    /// Token value, injected as `Bearer {value}`.
    fn value(&self) -> &str;

    /// Whether the token should be replaced before the next request.
    fn needs_refresh(&self) -> bool;
}

/// Fetches new tokens when the cached one is missing or stale.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Get a fresh token. `previous` holds the stale token being replaced,
    /// when there is one.
    async fn get_token(&self, previous: Option<Arc<dyn Token>>) -> Result<Arc<dyn Token>>;
}

/// Token cache shared by all clones of a client.
///
/// Reads take a snapshot under a short lock, so concurrent requests never
/// block each other on the fast path. When a refresh is needed, exactly one
/// caller runs the provider while the rest wait for the published result.
#[derive(Default)]
pub struct TokenCache {
    current: RwLock<Option<Arc<dyn Token>>>,
    refresh: Mutex<()>,
}

impl TokenCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a token that does not need a refresh, fetching one through
    /// `provider` if necessary.
    pub async fn get_valid_token(&self, provider: &dyn TokenProvider) -> Result<Arc<dyn Token>> {
        if let Some(token) = self.snapshot()
            && !token.needs_refresh()
        {
            return Ok(token);
        }

        let _refresh = self.refresh.lock().await;

        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = self.snapshot()
            && !token.needs_refresh()
        {
            return Ok(token);
        }

        let previous = self.snapshot();
        debug!("refreshing bearer token");
        let token = provider.get_token(previous).await?;
        *self.current.write() = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token, forcing a refresh on the next request.
    pub fn invalidate(&self) {
        *self.current.write() = None;
    }

    fn snapshot(&self) -> Option<Arc<dyn Token>> {
        self.current.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct TestToken {
        value: String,
        stale: AtomicBool,
    }

    impl Token for TestToken {
        fn value(&self) -> &str {
            &self.value
        }

        fn needs_refresh(&self) -> bool {
            self.stale.load(Ordering::SeqCst)
        }
    }

    struct CountingProvider {
        calls: AtomicUsize,
    }

    impl CountingProvider {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TokenProvider for CountingProvider {
        async fn get_token(&self, _previous: Option<Arc<dyn Token>>) -> Result<Arc<dyn Token>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            // Widen the window in which concurrent callers could pile up.
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(Arc::new(TestToken {
                value: format!("token-{call}"),
                stale: AtomicBool::new(false),
            }))
        }
    }

    #[tokio::test]
    async fn test_fresh_token_is_reused() {
        let cache = TokenCache::new();
        let provider = CountingProvider::new();

        let first = cache.get_valid_token(&provider).await.unwrap();
        let second = cache.get_valid_token(&provider).await.unwrap();

        assert_eq!(first.value(), "token-1");
        assert_eq!(second.value(), "token-1");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_token_is_replaced() {
        let cache = TokenCache::new();
        let provider = CountingProvider::new();

        let first = cache.get_valid_token(&provider).await.unwrap();
        assert_eq!(first.value(), "token-1");

        *cache.current.write() = Some(Arc::new(TestToken {
            value: "expired".to_string(),
            stale: AtomicBool::new(true),
        }));

        let second = cache.get_valid_token(&provider).await.unwrap();
        assert_eq!(second.value(), "token-2");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_refresh_once() {
        let cache = TokenCache::new();
        let provider = CountingProvider::new();

        let (a, b, c, d) = tokio::join!(
            cache.get_valid_token(&provider),
            cache.get_valid_token(&provider),
            cache.get_valid_token(&provider),
            cache.get_valid_token(&provider),
        );

        for token in [a.unwrap(), b.unwrap(), c.unwrap(), d.unwrap()] {
            assert_eq!(token.value(), "token-1");
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let cache = TokenCache::new();
        let provider = CountingProvider::new();

        cache.get_valid_token(&provider).await.unwrap();
        cache.invalidate();
        let token = cache.get_valid_token(&provider).await.unwrap();

        assert_eq!(token.value(), "token-2");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
