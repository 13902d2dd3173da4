//! Counter store port - the atomic key-value substrate behind quota checks.

use std::time::Duration;

use async_trait::async_trait;

/// Reply of the sliding-window script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindowReply {
    pub allowed: bool,
    pub remaining: i64,
    /// Seconds until the oldest entry leaves the window. Zero when allowed.
    pub retry_after: i64,
}

/// Reply of the fixed-window script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindowReply {
    pub allowed: bool,
    pub remaining: i64,
    /// Seconds left on the window key.
    pub ttl: i64,
    /// Equal to `ttl` when denied, zero otherwise.
    pub retry_after: i64,
}

/// Counter store trait - abstraction over quota state backends (Redis, in-memory).
///
/// Both window operations must execute as one atomic unit on the store side.
/// Every method reports store unavailability with a sentinel (`None` or
/// `false`) rather than an error, so callers can fail open.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Whether the store was reachable when the client was set up.
    fn is_connected(&self) -> bool;

    /// Round-trip liveness probe.
    async fn ping(&self) -> bool;

    /// Evict entries older than the window, then admit and record the
    /// request if fewer than `max_requests` remain.
    async fn sliding_window(
        &self,
        key: &str,
        now: i64,
        window_secs: u64,
        max_requests: u32,
        unique_token: &str,
    ) -> Option<SlidingWindowReply>;

    /// Increment the window counter, starting the window on the first hit.
    async fn fixed_window(
        &self,
        key: &str,
        max_requests: u32,
        window_secs: u64,
    ) -> Option<FixedWindowReply>;

    async fn get(&self, key: &str) -> Option<String>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> bool;

    async fn delete(&self, keys: &[&str]) -> bool;

    /// Drop every key. Test reset hook.
    async fn flush(&self) -> bool;
}
