//! Remote-first store access with local fallback.
//!
//! Backend selection happens once, at construction. Each operation tries the
//! remote store (if any) under a bounded timeout and, on any error, redoes
//! the whole operation against the local store. Remote failures are logged
//! and never reach the caller.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::clock::Clock;
use super::local::LocalStore;
use super::remote::RemoteStore;
use super::store::{CounterStore, WindowCount};
use crate::config::StoreConfig;
use crate::error::{RatewallError, Result};

/// Default budget for one remote operation.
const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_millis(1500);

/// The configured remote store, if any, backed by the local store.
pub struct FallbackStore {
    remote: Option<Arc<dyn CounterStore>>,
    local: Arc<LocalStore>,
    remote_timeout: Duration,
}

impl FallbackStore {
    /// Use only the local store.
    pub fn local_only(local: Arc<LocalStore>) -> Self {
        Self {
            remote: None,
            local,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    /// Try `remote` first, falling back to `local`.
    pub fn with_remote(remote: Arc<dyn CounterStore>, local: Arc<LocalStore>) -> Self {
        Self {
            remote: Some(remote),
            local,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    /// Select the backend from configuration.
    ///
    /// The remote store is used only when both its URL and token are set.
    pub fn from_config(config: &StoreConfig, local: Arc<LocalStore>) -> Result<Self> {
        match config.remote() {
            Some(endpoint) => {
                info!(url = %endpoint.url, "Using remote counter store with local fallback");
                let remote = RemoteStore::new(endpoint, config.request_timeout())?;
                Ok(Self::with_remote(Arc::new(remote), local)
                    .with_remote_timeout(config.request_timeout()))
            }
            None => {
                info!("Remote counter store not configured, using local store only");
                Ok(Self::local_only(local))
            }
        }
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Name of the primary backend.
    pub fn primary(&self) -> &'static str {
        self.remote.as_ref().map(|r| r.name()).unwrap_or_else(|| self.local.name())
    }

    pub fn local(&self) -> &Arc<LocalStore> {
        &self.local
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        self.local.clock()
    }

    /// Run `op` against the remote store within the timeout budget.
    async fn try_remote<T, F>(&self, op: &'static str, key: &str, f: F) -> Option<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let result = match tokio::time::timeout(self.remote_timeout, f).await {
            Ok(result) => result,
            Err(_) => Err(RatewallError::Store(format!(
                "timed out after {:?}",
                self.remote_timeout
            ))),
        };

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                // Keys carry phone numbers and user ids; keep them out of warn
                warn!(op = op, error = %e, "Remote counter store failed, falling back to local store");
                debug!(op = op, key = %key, "Remote operation redone locally");
                None
            }
        }
    }

    /// Increment a window counter.
    ///
    /// The count comes entirely from one backend; results are never mixed.
    pub async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount> {
        if let Some(remote) = &self.remote {
            let attempt = self
                .try_remote("increment", key, remote.increment_and_get(key, window))
                .await;
            if let Some(count) = attempt {
                return Ok(count);
            }
        }
        self.local.increment(key, window)
    }

    /// Whether `key` is present and unexpired in either backend.
    ///
    /// Entries written to the local store while the remote was failing stay
    /// visible after it recovers.
    pub async fn exists(&self, key: &str) -> bool {
        if let Some(remote) = &self.remote {
            if let Some(true) = self.try_remote("exists", key, remote.exists(key)).await {
                return true;
            }
        }
        self.local.contains(key)
    }

    /// Store `value` under `key` for `ttl`.
    ///
    /// A zero `ttl` expires at once on every backend, which is the same as
    /// removing the key.
    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) {
        if ttl.is_zero() {
            debug!(key = %key, "Zero TTL, removing key instead");
            self.remove(key).await;
            return;
        }
        if let Some(remote) = &self.remote {
            let attempt = self
                .try_remote("set_with_ttl", key, remote.set_with_ttl(key, value, ttl))
                .await;
            if attempt.is_some() {
                return;
            }
        }
        self.local.set(key, value, ttl);
    }

    /// Remove `key` from both backends.
    pub async fn remove(&self, key: &str) {
        if let Some(remote) = &self.remote {
            if self.try_remote("remove", key, remote.remove(key)).await.is_none() {
                error!(op = "remove", "Key could not be removed from the remote store");
                debug!(key = %key, "Remote removal failed");
            }
        }
        self.local.delete(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// A store that fails every operation.
    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn increment_and_get(&self, _key: &str, _window: Duration) -> Result<WindowCount> {
            Err(RatewallError::Store("connection refused".into()))
        }

        async fn exists(&self, _key: &str) -> Result<bool> {
            Err(RatewallError::Store("connection refused".into()))
        }

        async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(RatewallError::Store("connection refused".into()))
        }

        async fn remove(&self, _key: &str) -> Result<()> {
            Err(RatewallError::Store("connection refused".into()))
        }
    }

    /// A store that never answers.
    struct HangingStore;

    #[async_trait]
    impl CounterStore for HangingStore {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn increment_and_get(&self, _key: &str, _window: Duration) -> Result<WindowCount> {
            std::future::pending().await
        }

        async fn exists(&self, _key: &str) -> Result<bool> {
            std::future::pending().await
        }

        async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            std::future::pending().await
        }

        async fn remove(&self, _key: &str) -> Result<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_local_only_uses_local() {
        let local = Arc::new(LocalStore::new());
        let store = FallbackStore::local_only(local.clone());
        assert_eq!(store.primary(), "local");

        let count = store.increment("k", Duration::from_secs(60)).await.unwrap();
        assert_eq!(count.count, 1);
        assert_eq!(local.counter("k").unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_broken_remote_falls_back() {
        let local = Arc::new(LocalStore::new());
        let store = FallbackStore::with_remote(Arc::new(BrokenStore), local.clone());
        assert_eq!(store.primary(), "broken");

        assert_eq!(store.increment("k", Duration::from_secs(60)).await.unwrap().count, 1);
        assert_eq!(store.increment("k", Duration::from_secs(60)).await.unwrap().count, 2);

        store.set_with_ttl("blocked:x", "1", Duration::from_secs(60)).await;
        assert!(store.exists("blocked:x").await);

        store.remove("blocked:x").await;
        assert!(!store.exists("blocked:x").await);
    }

    #[tokio::test]
    async fn test_zero_ttl_removes_key() {
        let local = Arc::new(LocalStore::new());
        let store = FallbackStore::local_only(local.clone());

        store.set_with_ttl("blocked:x", "1", Duration::from_secs(60)).await;
        assert!(store.exists("blocked:x").await);

        store.set_with_ttl("blocked:x", "1", Duration::ZERO).await;
        assert!(!store.exists("blocked:x").await);
        assert!(local.is_empty());
    }

    #[tokio::test]
    async fn test_hanging_remote_times_out() {
        let local = Arc::new(LocalStore::new());
        let store = FallbackStore::with_remote(Arc::new(HangingStore), local)
            .with_remote_timeout(Duration::from_millis(50));

        let started = std::time::Instant::now();
        let count = store.increment("k", Duration::from_secs(60)).await.unwrap();
        assert_eq!(count.count, 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_from_config_without_token_is_local() {
        let config = StoreConfig {
            remote_url: Some("https://counters.example.com".to_string()),
            ..StoreConfig::default()
        };
        let store = FallbackStore::from_config(&config, Arc::new(LocalStore::new())).unwrap();
        assert_eq!(store.primary(), "local");
    }

    #[test]
    fn test_from_config_with_remote() {
        let config = StoreConfig {
            remote_url: Some("https://counters.example.com".to_string()),
            remote_token: Some("token".to_string()),
            ..StoreConfig::default()
        };
        let store = FallbackStore::from_config(&config, Arc::new(LocalStore::new())).unwrap();
        assert_eq!(store.primary(), "remote");
    }
}
