//! Counter store trait for abstracting the local and remote backends.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Result of an atomic increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Count after the increment
    pub count: u64,
    /// Time left until the window resets
    pub ttl: Duration,
}

/// A key to (count, expiry) store.
///
/// Implemented by the in-process `LocalStore` and the shared `RemoteStore`,
/// so the rate limiter and block list can work with either.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Atomically increment `key`, opening a window of `window` on the first hit.
    async fn increment_and_get(&self, key: &str, window: Duration) -> Result<WindowCount>;

    /// Whether `key` is present and unexpired.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Remove `key` if present.
    async fn remove(&self, key: &str) -> Result<()>;
}
