//! Core rate limiter implementation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace};

use super::clock::to_chrono;
use super::fallback::FallbackStore;
use super::key::CounterKey;
use super::policy::{Policy, PolicyName};
use super::store::WindowCount;
use crate::error::Result;

/// The outcome of one rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub allowed: bool,
    pub limit: u64,
    /// `max(0, limit - count)`
    pub remaining: u64,
    /// When the current window ends
    pub reset_at: DateTime<Utc>,
    /// Seconds until the window resets, set only on denial
    pub retry_after_secs: Option<u64>,
}

impl Decision {
    fn from_count(policy: &Policy, counted: WindowCount, now: DateTime<Utc>) -> Self {
        let allowed = counted.count <= policy.limit;
        Self {
            allowed,
            limit: policy.limit,
            remaining: policy.limit.saturating_sub(counted.count),
            reset_at: whole_second(now + to_chrono(counted.ttl)),
            retry_after_secs: (!allowed).then(|| ceil_secs(counted.ttl)),
        }
    }

    /// Seconds from `now` until `reset_at`, rounded up.
    pub fn reset_in(&self, now: DateTime<Utc>) -> u64 {
        ceil_secs((self.reset_at - now).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Round to the nearest whole second.
///
/// Remote TTLs are read back relative to the moment of the call, so the
/// derived instant jitters by a few milliseconds between calls in one window.
fn whole_second(t: DateTime<Utc>) -> DateTime<Utc> {
    let secs = (t.timestamp_millis() + 500).div_euclid(1000);
    DateTime::from_timestamp(secs, 0).unwrap_or(t)
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

/// Fixed-window rate limiter.
///
/// Every check increments the counter, including checks that are denied, so
/// retry floods cannot avoid being counted. Up to `limit` requests pass per
/// aligned window; a client straddling a boundary can get `2 * limit - 1`
/// through across the two windows.
pub struct RateLimiter {
    stores: Arc<FallbackStore>,
}

impl RateLimiter {
    pub fn new(stores: Arc<FallbackStore>) -> Self {
        Self { stores }
    }

    pub fn stores(&self) -> &Arc<FallbackStore> {
        &self.stores
    }

    /// Check and count one request for `identifier` under `policy`.
    pub async fn evaluate(&self, identifier: &str, policy: &Policy) -> Decision {
        let key = CounterKey::new(&policy.name, identifier);

        trace!(key = %key, limit = policy.limit, window = policy.window_secs, "Checking rate limit");

        let counted = match self.stores.increment(key.as_str(), policy.window()).await {
            Ok(counted) => counted,
            Err(e) => {
                // Only reachable if the local store refuses the key; count it as the first hit
                error!(policy = %policy.name, error = %e, "Local counter store failed");
                WindowCount {
                    count: 1,
                    ttl: policy.window(),
                }
            }
        };

        let now = self.stores.clock().now();
        let decision = Decision::from_count(policy, counted, now);

        if !decision.allowed {
            debug!(
                key = %key,
                count = counted.count,
                limit = policy.limit,
                retry_after = ?decision.retry_after_secs,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Check one request against an explicit `(limit, window)` pair.
    pub async fn evaluate_limit(
        &self,
        name: &str,
        identifier: &str,
        limit: u64,
        window_secs: u64,
    ) -> Result<Decision> {
        let policy = Policy::custom(name, limit, window_secs)?;
        Ok(self.evaluate(identifier, &policy).await)
    }

    /// Bind a registered policy.
    pub fn policy(&self, name: PolicyName) -> BoundPolicy<'_> {
        BoundPolicy {
            limiter: self,
            policy: name.policy(),
        }
    }

    /// Clear the counter for `identifier` under `policy`.
    ///
    /// Blocks are untouched.
    pub async fn reset(&self, identifier: &str, policy: &Policy) {
        let key = CounterKey::new(&policy.name, identifier);
        debug!(key = %key, "Resetting rate limit counter");
        self.stores.remove(key.as_str()).await;
    }
}

/// A registered policy bound to a limiter.
#[derive(Clone, Copy)]
pub struct BoundPolicy<'a> {
    limiter: &'a RateLimiter,
    policy: &'static Policy,
}

impl BoundPolicy<'_> {
    pub async fn check(&self, identifier: &str) -> Decision {
        self.limiter.evaluate(identifier, self.policy).await
    }

    pub fn policy(&self) -> &'static Policy {
        self.policy
    }
}
