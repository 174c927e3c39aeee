//! Explicit, TTL-based abuse blocks.
//!
//! A block is a sentinel stored under its own key space. While present it
//! denies the identifier regardless of any window counter. Blocks are
//! imposed by collaborators that detect abuse beyond ordinary rate limiting,
//! such as repeated wrong OTP codes.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::fallback::FallbackStore;
use super::key::BlockKey;

const SENTINEL: &str = "1";

/// Deny list keyed by identifier.
pub struct BlockList {
    stores: Arc<FallbackStore>,
}

impl BlockList {
    pub fn new(stores: Arc<FallbackStore>) -> Self {
        Self { stores }
    }

    /// Block `identifier` for `duration`.
    pub async fn block(&self, identifier: &str, duration: Duration) {
        let key = BlockKey::new(identifier);
        debug!(key = %key, duration_secs = duration.as_secs(), "Blocking identifier");
        self.stores.set_with_ttl(key.as_str(), SENTINEL, duration).await;
    }

    /// Whether `identifier` is currently blocked.
    pub async fn is_blocked(&self, identifier: &str) -> bool {
        let key = BlockKey::new(identifier);
        let blocked = self.stores.exists(key.as_str()).await;
        if blocked {
            debug!(key = %key, "Identifier is blocked");
        }
        blocked
    }

    /// Lift a block early. Rate limit counters are untouched.
    pub async fn unblock(&self, identifier: &str) {
        let key = BlockKey::new(identifier);
        debug!(key = %key, "Unblocking identifier");
        self.stores.remove(key.as_str()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::key::CounterKey;
    use crate::ratelimit::limiter::RateLimiter;
    use crate::ratelimit::local::LocalStore;
    use crate::ratelimit::policy::OTP_VERIFY;

    fn stores_with_clock() -> (Arc<ManualClock>, Arc<FallbackStore>) {
        let clock = Arc::new(ManualClock::default());
        let local = Arc::new(LocalStore::with_clock(clock.clone()));
        (clock, Arc::new(FallbackStore::local_only(local)))
    }

    #[tokio::test]
    async fn test_block_expires() {
        let (clock, stores) = stores_with_clock();
        let blocks = BlockList::new(stores);

        assert!(!blocks.is_blocked("+966500000000").await);

        blocks.block("+966500000000", Duration::from_secs(86400)).await;
        assert!(blocks.is_blocked("+966500000000").await);

        clock.advance(Duration::from_secs(86399));
        assert!(blocks.is_blocked("+966500000000").await);

        clock.advance(Duration::from_secs(2));
        assert!(!blocks.is_blocked("+966500000000").await);
    }

    #[tokio::test]
    async fn test_unblock() {
        let (_clock, stores) = stores_with_clock();
        let blocks = BlockList::new(stores);

        blocks.block("ip:10.0.0.1", Duration::from_secs(600)).await;
        blocks.unblock("ip:10.0.0.1").await;
        assert!(!blocks.is_blocked("ip:10.0.0.1").await);
    }

    #[tokio::test]
    async fn test_blocks_and_counters_are_independent() {
        let (_clock, stores) = stores_with_clock();
        let blocks = BlockList::new(stores.clone());
        let limiter = RateLimiter::new(stores.clone());
        let phone = "+966500000000";

        for _ in 0..6 {
            limiter.evaluate(phone, &OTP_VERIFY).await;
        }
        blocks.block(phone, Duration::from_secs(3600)).await;

        // Clearing the block leaves the counter in place
        blocks.unblock(phone).await;
        let counter_key = CounterKey::new("otp-verify", phone);
        assert_eq!(stores.local().counter(counter_key.as_str()).unwrap().count, 6);

        // Clearing the counter leaves a block in place
        blocks.block(phone, Duration::from_secs(3600)).await;
        limiter.reset(phone, &OTP_VERIFY).await;
        assert!(blocks.is_blocked(phone).await);
        assert!(limiter.evaluate(phone, &OTP_VERIFY).await.allowed);
    }

    #[tokio::test]
    async fn test_block_is_not_a_counter() {
        let (_clock, stores) = stores_with_clock();
        let blocks = BlockList::new(stores.clone());

        blocks.block("user:7", Duration::from_secs(60)).await;
        assert!(stores.local().counter(BlockKey::new("user:7").as_str()).is_none());
        assert_eq!(
            stores.local().get(BlockKey::new("user:7").as_str()).as_deref(),
            Some(SENTINEL)
        );
    }
}
