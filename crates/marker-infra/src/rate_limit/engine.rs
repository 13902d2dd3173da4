//! Dual-window quota engine: sliding per-minute window, fixed per-day window.

use std::sync::Arc;

use async_trait::async_trait;

use marker_core::domain::{
    AuthClass, DAY_WINDOW_SECS, LimitTable, MINUTE_WINDOW_SECS, OperationClass, QuotaDecision,
    QuotaKey,
};
use marker_core::ports::{CounterStore, RateLimiter};

/// Quota engine over a shared counter store.
///
/// Holds no counters of its own; every check is a fresh round-trip to the
/// store, whose scripts serialize concurrent checks for the same key.
pub struct QuotaEngine {
    store: Arc<dyn CounterStore>,
    limits: LimitTable,
}

impl QuotaEngine {
    pub fn new(store: Arc<dyn CounterStore>, limits: LimitTable) -> Self {
        Self { store, limits }
    }

    /// Engine with the built-in limit table.
    pub fn with_default_limits(store: Arc<dyn CounterStore>) -> Self {
        Self::new(store, LimitTable::default())
    }

    /// Sliding window check for the per-minute limit.
    async fn check_minute(&self, key: &QuotaKey, max_requests: u32, now: i64) -> QuotaDecision {
        let token = uuid::Uuid::new_v4().to_string();
        let reply = self
            .store
            .sliding_window(
                &key.to_string(),
                now,
                MINUTE_WINDOW_SECS,
                max_requests,
                &token,
            )
            .await;

        let Some(reply) = reply else {
            tracing::warn!(key = %key, "Counter store unavailable, failing open");
            return QuotaDecision::fail_open(max_requests);
        };

        let reset = now + MINUTE_WINDOW_SECS as i64;
        if reply.allowed {
            QuotaDecision::allowed(max_requests, clamp_count(reply.remaining), reset)
        } else {
            QuotaDecision::denied(max_requests, reset, reply.retry_after.max(0) as u64)
        }
    }

    /// Fixed window check for the per-day limit.
    async fn check_daily(&self, key: &QuotaKey, max_requests: u32, now: i64) -> QuotaDecision {
        let reply = self
            .store
            .fixed_window(&key.to_string(), max_requests, DAY_WINDOW_SECS)
            .await;

        let Some(reply) = reply else {
            tracing::warn!(key = %key, "Counter store unavailable, failing open");
            return QuotaDecision::fail_open(max_requests);
        };

        let reset = if reply.ttl > 0 {
            now + reply.ttl
        } else {
            now + DAY_WINDOW_SECS as i64
        };
        if reply.allowed {
            QuotaDecision::allowed(max_requests, clamp_count(reply.remaining), reset)
        } else {
            QuotaDecision::denied(max_requests, reset, reply.retry_after.max(0) as u64)
        }
    }
}

fn clamp_count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[async_trait]
impl RateLimiter for QuotaEngine {
    async fn check(
        &self,
        subject_id: i64,
        auth_class: AuthClass,
        operation: OperationClass,
    ) -> QuotaDecision {
        let Some(policy) = self.limits.get(auth_class, operation) else {
            // Authentication should have rejected this combination already.
            tracing::debug!(
                subject_id,
                auth_class = %auth_class,
                operation = %operation,
                "No rate limit configured, allowing"
            );
            return QuotaDecision::unconfigured();
        };

        if !self.store.is_connected() {
            tracing::warn!(operation = "rate_limit", "Counter store unavailable, failing open");
            return QuotaDecision::fail_open(policy.requests_per_minute);
        }

        let now = chrono::Utc::now().timestamp();

        let minute_key = QuotaKey::minute(subject_id, auth_class, operation);
        let minute = self
            .check_minute(&minute_key, policy.requests_per_minute, now)
            .await;
        if !minute.allowed {
            tracing::warn!(
                subject_id,
                auth_class = %auth_class,
                operation = %operation,
                limit_type = "per_minute",
                retry_after = minute.retry_after_seconds,
                "Rate limit exceeded"
            );
            return minute;
        }

        let daily_key = QuotaKey::daily(subject_id, operation);
        let daily = self
            .check_daily(&daily_key, policy.requests_per_day, now)
            .await;
        if !daily.allowed {
            tracing::warn!(
                subject_id,
                auth_class = %auth_class,
                operation = %operation,
                limit_type = "daily",
                retry_after = daily.retry_after_seconds,
                "Rate limit exceeded"
            );
            return daily;
        }

        minute
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCounterStore;
    use marker_core::domain::AuthClass::{InteractiveSession, PersonalToken};
    use marker_core::domain::LimitPolicy;
    use marker_core::domain::OperationClass::{Read, Sensitive, Write};

    fn engine_with(store: Arc<InMemoryCounterStore>, limits: LimitTable) -> QuotaEngine {
        QuotaEngine::new(store, limits)
    }

    fn small_limits(per_minute: u32, per_day: u32) -> LimitTable {
        LimitTable::new([
            ((PersonalToken, Read), LimitPolicy::new(per_minute, per_day)),
            ((PersonalToken, Write), LimitPolicy::new(per_minute, per_day)),
            ((InteractiveSession, Read), LimitPolicy::new(per_minute, per_day)),
            ((InteractiveSession, Write), LimitPolicy::new(per_minute, per_day)),
            ((InteractiveSession, Sensitive), LimitPolicy::new(per_minute, per_day)),
        ])
    }

    /// Exhaust a daily pool the same way repeated requests would.
    async fn exhaust_daily(store: &InMemoryCounterStore, key: QuotaKey, limit: u32) {
        for _ in 0..limit {
            store
                .fixed_window(&key.to_string(), limit, DAY_WINDOW_SECS)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_sensitive_scenario_thirty_then_denied() {
        let store = Arc::new(InMemoryCounterStore::new());
        let engine = QuotaEngine::with_default_limits(store);

        let mut last = None;
        for _ in 0..30 {
            let decision = engine.check(42, InteractiveSession, Sensitive).await;
            assert!(decision.allowed);
            assert_eq!(decision.limit, 30);
            last = Some(decision);
        }
        assert_eq!(last.unwrap().remaining, 0);

        let denied = engine.check(42, InteractiveSession, Sensitive).await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!((1..=60).contains(&denied.retry_after_seconds));
    }

    #[tokio::test]
    async fn test_remaining_counts_down_to_zero_then_denies() {
        let store = Arc::new(InMemoryCounterStore::new());
        let engine = engine_with(store, small_limits(3, 100));

        for expected in [2, 1, 0] {
            let decision = engine.check(1, PersonalToken, Write).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected);
        }

        let decision = engine.check(1, PersonalToken, Write).await;
        assert!(!decision.allowed);
        assert!(decision.retry_after_seconds > 0);
    }

    #[tokio::test]
    async fn test_subjects_do_not_share_quota() {
        let store = Arc::new(InMemoryCounterStore::new());
        let engine = engine_with(store, small_limits(2, 100));

        for _ in 0..2 {
            engine.check(100, InteractiveSession, Read).await;
        }
        assert!(!engine.check(100, InteractiveSession, Read).await.allowed);

        let other = engine.check(200, InteractiveSession, Read).await;
        assert!(other.allowed);
        assert_eq!(other.remaining, 1);
    }

    #[tokio::test]
    async fn test_personal_token_limit_is_below_session_limit() {
        let store = Arc::new(InMemoryCounterStore::new());
        let engine = QuotaEngine::with_default_limits(store);

        let pat = engine.check(1, PersonalToken, Read).await;
        let session = engine.check(2, InteractiveSession, Read).await;

        assert!(pat.limit < session.limit);
    }

    #[tokio::test]
    async fn test_allowed_decision_has_minute_reset() {
        let store = Arc::new(InMemoryCounterStore::new());
        let engine = QuotaEngine::with_default_limits(store);
        let now = chrono::Utc::now().timestamp();

        let decision = engine.check(1, InteractiveSession, Read).await;

        assert!(decision.allowed);
        assert!(decision.limit > 0);
        assert_eq!(decision.retry_after_seconds, 0);
        assert!(decision.reset_epoch_seconds > now);
        assert!(decision.reset_epoch_seconds <= now + 61);
    }

    #[tokio::test]
    async fn test_daily_check_reset_is_within_a_day() {
        let store = Arc::new(InMemoryCounterStore::new());
        let engine = QuotaEngine::with_default_limits(store);
        let now = chrono::Utc::now().timestamp();

        let key = QuotaKey::daily(9, Read);
        let decision = engine.check_daily(&key, 5, now).await;

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
        assert!(decision.reset_epoch_seconds > now);
        assert!(decision.reset_epoch_seconds <= now + DAY_WINDOW_SECS as i64);
    }

    #[tokio::test]
    async fn test_daily_limit_blocks_when_minute_has_room() {
        let store = Arc::new(InMemoryCounterStore::new());
        let engine = engine_with(store.clone(), small_limits(50, 10));

        exhaust_daily(&store, QuotaKey::daily(5000, Read), 10).await;

        let decision = engine.check(5000, InteractiveSession, Read).await;
        assert!(!decision.allowed);
        assert_eq!(decision.limit, 10);
        assert!(decision.retry_after_seconds > 60);
    }

    #[tokio::test]
    async fn test_read_and_write_share_general_pool() {
        let store = Arc::new(InMemoryCounterStore::new());
        let engine = engine_with(store, small_limits(50, 3));

        for _ in 0..3 {
            assert!(engine.check(5004, InteractiveSession, Read).await.allowed);
        }

        assert!(!engine.check(5004, InteractiveSession, Write).await.allowed);
    }

    #[tokio::test]
    async fn test_sensitive_pool_is_independent_of_general_pool() {
        let store = Arc::new(InMemoryCounterStore::new());
        let engine = engine_with(store.clone(), small_limits(50, 5));

        exhaust_daily(&store, QuotaKey::daily(5001, Read), 5).await;
        assert!(!engine.check(5001, InteractiveSession, Read).await.allowed);
        assert!(engine.check(5001, InteractiveSession, Sensitive).await.allowed);

        exhaust_daily(&store, QuotaKey::daily(5002, Sensitive), 5).await;
        assert!(!engine.check(5002, InteractiveSession, Sensitive).await.allowed);
        assert!(engine.check(5002, InteractiveSession, Read).await.allowed);
    }

    #[tokio::test]
    async fn test_minute_denial_does_not_consume_daily_quota() {
        let store = Arc::new(InMemoryCounterStore::new());
        let engine = engine_with(store.clone(), small_limits(1, 100));

        engine.check(7, InteractiveSession, Read).await;
        for _ in 0..5 {
            assert!(!engine.check(7, InteractiveSession, Read).await.allowed);
        }

        let key = QuotaKey::daily(7, Read).to_string();
        assert_eq!(store.get(&key).await, Some("1".to_string()));
    }

    #[tokio::test]
    async fn test_disconnected_store_always_allows() {
        let store = Arc::new(InMemoryCounterStore::disconnected());
        let engine = engine_with(store, small_limits(1, 1));

        for _ in 0..10 {
            let decision = engine.check(1, InteractiveSession, Read).await;
            assert!(decision.allowed);
            assert_eq!(decision.limit, 1);
            assert_eq!(decision.remaining, 1);
        }
    }

    #[tokio::test]
    async fn test_store_outage_mid_flight_fails_open() {
        let store = Arc::new(InMemoryCounterStore::new());
        let engine = engine_with(store.clone(), small_limits(1, 100));

        engine.check(3, PersonalToken, Read).await;
        assert!(!engine.check(3, PersonalToken, Read).await.allowed);

        store.set_connected(false);
        assert!(engine.check(3, PersonalToken, Read).await.allowed);
    }

    #[tokio::test]
    async fn test_unconfigured_combination_is_permissive() {
        let store = Arc::new(InMemoryCounterStore::new());
        let engine = QuotaEngine::with_default_limits(store);

        let decision = engine.check(1, PersonalToken, Sensitive).await;

        assert!(decision.allowed);
        assert_eq!(decision.limit, 0);
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_admit_exactly_the_limit() {
        let store = Arc::new(InMemoryCounterStore::new());
        let engine = Arc::new(engine_with(store, small_limits(10, 1000)));

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.check(1, InteractiveSession, Read).await })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            let decision = handle.await.unwrap();
            if decision.allowed {
                admitted += 1;
            } else {
                assert!(decision.retry_after_seconds > 0);
                assert_eq!(decision.remaining, 0);
            }
        }

        assert_eq!(admitted, 10);
    }
}
