//! Shared counter store reached over a Redis-over-REST API.
//!
//! Each command is a `POST` of a JSON array (`["INCR", "key"]`) to the base
//! URL with a bearer token. Replies are `{"result": ...}` or
//! `{"error": "..."}`. Every request carries a bounded timeout so a slow
//! store fails fast into the local fallback.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::trace;

use super::store::{CounterStore, WindowCount};
use crate::config::RemoteEndpoint;
use crate::error::{RatewallError, Result};

/// Reply envelope of the REST store.
#[derive(Debug, Deserialize)]
struct RestReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Counter store shared by every process in a deployment.
pub struct RemoteStore {
    client: reqwest::Client,
    endpoint: RemoteEndpoint,
}

impl RemoteStore {
    /// Create a remote store whose commands time out after `timeout`.
    pub fn new(endpoint: RemoteEndpoint, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client, endpoint })
    }

    pub fn url(&self) -> &str {
        &self.endpoint.url
    }

    /// Run one command and return its `result`.
    async fn command(&self, args: Value) -> Result<Value> {
        trace!(command = %args, "Sending remote store command");

        let response = self
            .client
            .post(&self.endpoint.url)
            .bearer_auth(&self.endpoint.token)
            .json(&args)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RatewallError::Store(format!(
                "remote store returned {}: {}",
                status, body
            )));
        }

        let reply: RestReply = response.json().await?;
        if let Some(error) = reply.error {
            return Err(RatewallError::Store(error));
        }
        reply
            .result
            .ok_or_else(|| RatewallError::Store(format!("missing result for {}", args)))
    }

    /// Expire `key` at the end of a window starting now. Returns the time left.
    ///
    /// The deadline is an absolute, whole-second timestamp so every process
    /// reading the counter back derives the same reset instant.
    async fn expire_window(&self, key: &str, window: Duration) -> Result<Duration> {
        let now_ms = Utc::now().timestamp_millis();
        let deadline_ms = window_deadline_ms(now_ms, window);
        let applied = integer(self.command(json!(["PEXPIREAT", key, deadline_ms])).await?)?;
        if applied != 1 {
            return Err(RatewallError::Store(format!("PEXPIREAT not applied to {}", key)));
        }
        Ok(Duration::from_millis((deadline_ms - now_ms).max(0) as u64))
    }
}

#[async_trait]
impl CounterStore for RemoteStore {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn increment_and_get(&self, key: &str, window: Duration) -> Result<WindowCount> {
        let count = integer(self.command(json!(["INCR", key])).await?)?;
        if count < 1 {
            return Err(RatewallError::Store(format!(
                "INCR on {} returned {}",
                key, count
            )));
        }

        if count == 1 {
            self.expire_window(key, window).await?;
        }

        let pttl = integer(self.command(json!(["PTTL", key])).await?)?;
        let ttl = if pttl < 0 {
            // The expiry was lost; never leave a counter without one
            self.expire_window(key, window).await?
        } else {
            Duration::from_millis(pttl as u64)
        };

        Ok(WindowCount {
            count: count as u64,
            ttl,
        })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let found = integer(self.command(json!(["EXISTS", key])).await?)?;
        Ok(found > 0)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let reply = self
            .command(json!(["SET", key, value, "PX", millis(ttl)]))
            .await?;
        match reply.as_str() {
            Some("OK") => Ok(()),
            _ => Err(RatewallError::Store(format!("SET on {} returned {}", key, reply))),
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        integer(self.command(json!(["DEL", key])).await?)?;
        Ok(())
    }
}

/// Milliseconds for an expiry, never zero.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// End of a window opened at `now_ms`, rounded up to a whole second.
fn window_deadline_ms(now_ms: i64, window: Duration) -> i64 {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX / 2);
    let end = now_ms.saturating_add(window_ms);
    end.saturating_add(999).div_euclid(1000) * 1000
}

/// Read an integer reply, accepting numeric strings.
fn integer(value: Value) -> Result<i64> {
    let parsed = match &value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| RatewallError::Store(format!("expected integer reply, got {}", value)))
}
