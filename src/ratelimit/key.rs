//! Namespaced storage keys.
//!
//! Counters and blocks live in disjoint key spaces so a rate-limit denial and
//! an explicit block can be inspected and cleared independently.

/// Prefix for fixed-window counters.
pub const COUNTER_PREFIX: &str = "ratelimit";
/// Prefix for abuse blocks.
pub const BLOCK_PREFIX: &str = "blocked";

/// Key of a window counter: `ratelimit:<policy>:<identifier>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey(String);

impl CounterKey {
    pub fn new(policy: &str, identifier: &str) -> Self {
        Self(format!("{}:{}:{}", COUNTER_PREFIX, policy, identifier))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Key of an abuse block: `blocked:<identifier>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockKey(String);

impl BlockKey {
    pub fn new(identifier: &str) -> Self {
        Self(format!("{}:{}", BLOCK_PREFIX, identifier))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for BlockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
