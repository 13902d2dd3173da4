//! In-memory counter store - single-process substitute for Redis.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use marker_core::ports::{CounterStore, FixedWindowReply, SlidingWindowReply};

/// Every this many keyed operations the whole map is swept for expired keys.
const SWEEP_EVERY: u64 = 256;

enum Value {
    Counter(i64),
    /// Sorted `(timestamp, member)` pairs.
    Window(BTreeSet<(i64, String)>),
    Text(String),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Remaining lifetime in whole seconds, rounded up. -1 when the key has no expiry.
    fn ttl_secs(&self, now: Instant) -> i64 {
        match self.expires_at {
            Some(exp) => exp.saturating_duration_since(now).as_secs_f64().ceil() as i64,
            None => -1,
        }
    }
}

/// In-memory counter store using a HashMap behind one async mutex.
///
/// Every operation runs entirely under the lock, which gives the window
/// operations the same atomicity the Redis scripts have. Expired keys are
/// dropped when touched and by a periodic full sweep, so subjects that never
/// come back do not pin memory.
/// Note: State is per-process and lost on restart.
pub struct InMemoryCounterStore {
    store: Mutex<HashMap<String, Entry>>,
    connected: AtomicBool,
    ops: AtomicU64,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(true),
            ops: AtomicU64::new(0),
        }
    }

    /// A store that behaves like an unreachable backend.
    pub fn disconnected() -> Self {
        let store = Self::new();
        store.set_connected(false);
        store
    }

    /// Simulate losing or regaining the backend.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn online(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn purge_expired(&self, store: &mut HashMap<String, Entry>, key: &str, now: Instant) {
        if self.ops.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            let before = store.len();
            store.retain(|_, entry| !entry.is_expired(now));
            tracing::debug!(removed = before - store.len(), "Swept expired counter keys");
        } else if store.get(key).is_some_and(|e| e.is_expired(now)) {
            store.remove(key);
        }
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    fn is_connected(&self) -> bool {
        self.online()
    }

    async fn ping(&self) -> bool {
        self.online()
    }

    async fn sliding_window(
        &self,
        key: &str,
        now: i64,
        window_secs: u64,
        max_requests: u32,
        unique_token: &str,
    ) -> Option<SlidingWindowReply> {
        if !self.online() {
            return None;
        }

        let clock = Instant::now();
        let window = window_secs as i64;
        let limit = i64::from(max_requests);
        let mut store = self.store.lock().await;

        self.purge_expired(&mut store, key, clock);
        let entry = store.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Window(BTreeSet::new()),
            expires_at: None,
        });
        let Value::Window(entries) = &mut entry.value else {
            tracing::warn!(key, "Sliding window key holds another type");
            return None;
        };

        // Same bound as ZREMRANGEBYSCORE 0 (now - window): inclusive.
        entries.retain(|(ts, _)| *ts > now - window);
        let count = entries.len() as i64;

        if count < limit {
            entries.insert((now, format!("{now}:{unique_token}")));
            entry.expires_at = Some(clock + Duration::from_secs(window_secs));
            return Some(SlidingWindowReply {
                allowed: true,
                remaining: limit - count - 1,
                retry_after: 0,
            });
        }

        let retry_after = entries
            .first()
            .map(|(oldest, _)| oldest + window - now)
            .unwrap_or(0);

        Some(SlidingWindowReply {
            allowed: false,
            remaining: 0,
            retry_after,
        })
    }

    async fn fixed_window(
        &self,
        key: &str,
        max_requests: u32,
        window_secs: u64,
    ) -> Option<FixedWindowReply> {
        if !self.online() {
            return None;
        }

        let clock = Instant::now();
        let limit = i64::from(max_requests);
        let mut store = self.store.lock().await;

        self.purge_expired(&mut store, key, clock);
        let entry = store.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Counter(0),
            expires_at: None,
        });
        let Value::Counter(count) = &mut entry.value else {
            tracing::warn!(key, "Fixed window key holds another type");
            return None;
        };

        *count += 1;
        let count = *count;
        if count == 1 {
            entry.expires_at = Some(clock + Duration::from_secs(window_secs));
        }
        let ttl = entry.ttl_secs(clock);

        if count <= limit {
            Some(FixedWindowReply {
                allowed: true,
                remaining: limit - count,
                ttl,
                retry_after: 0,
            })
        } else {
            Some(FixedWindowReply {
                allowed: false,
                remaining: 0,
                ttl,
                retry_after: ttl,
            })
        }
    }

    async fn get(&self, key: &str) -> Option<String> {
        if !self.online() {
            return None;
        }

        let mut store = self.store.lock().await;
        self.purge_expired(&mut store, key, Instant::now());
        match store.get(key) {
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Some(text.clone()),
            Some(Entry {
                value: Value::Counter(count),
                ..
            }) => Some(count.to_string()),
            _ => None,
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> bool {
        if !self.online() {
            return false;
        }

        let mut store = self.store.lock().await;
        store.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        true
    }

    async fn delete(&self, keys: &[&str]) -> bool {
        if !self.online() {
            return false;
        }

        let mut store = self.store.lock().await;
        for key in keys {
            store.remove(*key);
        }
        true
    }

    async fn flush(&self) -> bool {
        if !self.online() {
            return false;
        }

        self.store.lock().await.clear();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sliding_window_admits_up_to_limit() {
        let store = InMemoryCounterStore::new();
        let now = 1_000;

        for expected in [2, 1, 0] {
            let reply = store
                .sliding_window("k", now, 60, 3, &uuid::Uuid::new_v4().to_string())
                .await
                .unwrap();
            assert!(reply.allowed);
            assert_eq!(reply.remaining, expected);
        }

        let reply = store
            .sliding_window("k", now + 10, 60, 3, "late")
            .await
            .unwrap();
        assert!(!reply.allowed);
        assert_eq!(reply.remaining, 0);
        assert_eq!(reply.retry_after, 50);
    }

    #[tokio::test]
    async fn test_sliding_window_evicts_old_entries() {
        let store = InMemoryCounterStore::new();

        assert!(store.sliding_window("k", 0, 60, 1, "a").await.unwrap().allowed);
        assert!(!store.sliding_window("k", 59, 60, 1, "b").await.unwrap().allowed);
        // The first entry is out of the window once 60 seconds have passed.
        assert!(store.sliding_window("k", 60, 60, 1, "c").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_sliding_window_has_no_boundary_burst() {
        let store = InMemoryCounterStore::new();

        for i in 0..2 {
            assert!(store.sliding_window("k", 58, 60, 2, &i.to_string()).await.unwrap().allowed);
        }
        // A fixed window would have reset at t=60.
        assert!(!store.sliding_window("k", 61, 60, 2, "x").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_fixed_window_counts_down_then_denies() {
        let store = InMemoryCounterStore::new();

        for expected in [2, 1, 0] {
            let reply = store.fixed_window("day", 3, 86_400).await.unwrap();
            assert!(reply.allowed);
            assert_eq!(reply.remaining, expected);
            assert!(reply.ttl > 0 && reply.ttl <= 86_400);
        }

        let reply = store.fixed_window("day", 3, 86_400).await.unwrap();
        assert!(!reply.allowed);
        assert_eq!(reply.remaining, 0);
        assert!(reply.ttl > 0);
        assert_eq!(reply.retry_after, reply.ttl);
    }

    #[tokio::test]
    async fn test_disconnected_store_returns_sentinels() {
        let store = InMemoryCounterStore::disconnected();

        assert!(!store.is_connected());
        assert!(!store.ping().await);
        assert!(store.sliding_window("k", 0, 60, 1, "a").await.is_none());
        assert!(store.fixed_window("k", 1, 60).await.is_none());
        assert_eq!(store.get("k").await, None);
        assert!(!store.set_ex("k", "v", Duration::from_secs(1)).await);
        assert!(!store.delete(&["k"]).await);
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = InMemoryCounterStore::new();

        assert!(store.set_ex("key1", "value1", Duration::from_secs(60)).await);
        assert_eq!(store.get("key1").await, Some("value1".to_string()));
        assert!(store.delete(&["key1"]).await);
        assert_eq!(store.get("key1").await, None);
    }

    #[tokio::test]
    async fn test_expired_value_is_gone() {
        let store = InMemoryCounterStore::new();

        store.set_ex("key1", "value1", Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("key1").await, None);
    }

    #[tokio::test]
    async fn test_flush_clears_all_windows() {
        let store = InMemoryCounterStore::new();

        store.fixed_window("day", 1, 60).await;
        assert!(!store.fixed_window("day", 1, 60).await.unwrap().allowed);

        assert!(store.flush().await);
        assert!(store.fixed_window("day", 1, 60).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_periodic_sweep_drops_abandoned_keys() {
        let store = InMemoryCounterStore::new();

        for i in 0..50 {
            store
                .set_ex(&format!("abandoned:{}", i), "v", Duration::from_millis(1))
                .await;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.store.lock().await.len(), 50);

        for _ in 0..SWEEP_EVERY {
            store.fixed_window("active", u32::MAX, 60).await.unwrap();
        }

        let entries = store.store.lock().await;
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("active"));
    }
}
