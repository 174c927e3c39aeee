//! In-process counter store.
//!
//! Counters live in a [`DashMap`] keyed by the namespaced key. Every
//! operation on a key runs under that key's shard lock, so concurrent
//! increments in one process never lose an update. Expiry is checked on
//! every read; the background sweep only bounds memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::clock::{to_chrono, Clock, SystemClock};
use super::counter::CounterEntry;
use super::store::{CounterStore, WindowCount};
use crate::error::{RatewallError, Result};

/// A stored value with its own absolute expiry.
#[derive(Debug, Clone)]
enum Slot {
    Counter(CounterEntry),
    Value {
        value: String,
        expires_at: DateTime<Utc>,
    },
}

impl Slot {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self {
            Slot::Counter(entry) => entry.is_expired(now),
            Slot::Value { expires_at, .. } => now >= *expires_at,
        }
    }
}

/// Process-local counter store.
///
/// Contents are lost on restart. Constructed once at startup and shared by
/// reference; there is no global instance.
pub struct LocalStore {
    entries: DashMap<String, Slot>,
    clock: Arc<dyn Clock>,
}

impl LocalStore {
    /// Create a store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Increment a counter without going through the async trait.
    pub fn increment(&self, key: &str, window: Duration) -> Result<WindowCount> {
        let now = self.clock.now();

        let entry = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if slot.is_expired(now) {
                    let fresh = CounterEntry::open(now, window);
                    *slot = Slot::Counter(fresh);
                    fresh
                } else {
                    match slot {
                        Slot::Counter(entry) => {
                            entry.hit(now, window);
                            *entry
                        }
                        Slot::Value { .. } => {
                            return Err(RatewallError::Store(format!(
                                "key {} does not hold a counter",
                                key
                            )));
                        }
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let entry = CounterEntry::open(now, window);
                vacant.insert(Slot::Counter(entry));
                entry
            }
        };

        trace!(key = %key, count = entry.count, "Local counter incremented");

        Ok(WindowCount {
            count: entry.count,
            ttl: entry.ttl(now),
        })
    }

    /// Current unexpired counter for a key, if any.
    pub fn counter(&self, key: &str) -> Option<CounterEntry> {
        let now = self.clock.now();
        self.entries.get(key).and_then(|slot| match slot.value() {
            Slot::Counter(entry) if !entry.is_expired(now) => Some(*entry),
            _ => None,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .get(key)
            .map(|slot| !slot.is_expired(now))
            .unwrap_or(false)
    }

    /// Current unexpired plain value for a key, if any.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        self.entries.get(key).and_then(|slot| match slot.value() {
            Slot::Value { value, expires_at } if now < *expires_at => Some(value.clone()),
            _ => None,
        })
    }

    pub fn set(&self, key: &str, value: &str, ttl: Duration) {
        let expires_at = self.clock.now() + to_chrono(ttl);
        self.entries.insert(
            key.to_string(),
            Slot::Value {
                value: value.to_string(),
                expires_at,
            },
        );
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, slot| !slot.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of physically stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all entries.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Start the periodic sweep on the current tokio runtime.
    ///
    /// The task runs until the returned handle is shut down or dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweepHandle {
        let store = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.sweep();
                        if removed > 0 {
                            debug!(removed = removed, remaining = store.len(), "Swept expired local entries");
                        }
                    }
                    _ = &mut shutdown_rx => {
                        debug!("Local store sweeper stopping");
                        break;
                    }
                }
            }
        });

        SweepHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn increment_and_get(&self, key: &str, window: Duration) -> Result<WindowCount> {
        self.increment(key, window)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.contains(key))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.set(key, value, ttl);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.delete(key);
        Ok(())
    }
}

/// Owner of the background sweep task.
pub struct SweepHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
