//! Application state - shared across all handlers.

use std::sync::Arc;

use marker_core::domain::LimitTable;
use marker_core::ports::{CounterStore, RateLimiter, TokenService};
use marker_infra::{InMemoryCounterStore, JwtTokenService, QuotaEngine};

use crate::config::{AppConfig, StoreBackend};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CounterStore>,
    pub limiter: Arc<dyn RateLimiter>,
    pub limits: Arc<LimitTable>,
    pub tokens: Arc<dyn TokenService>,
}

impl AppState {
    /// Build the application state with appropriate implementations.
    ///
    /// An unreachable Redis does not stop startup: the store stays
    /// disconnected and every quota check fails open.
    pub async fn new(config: &AppConfig) -> Self {
        let store = Self::build_store(config).await;
        let tokens: Arc<dyn TokenService> = Arc::new(JwtTokenService::from_env());

        let state = Self::from_parts(store, LimitTable::default(), tokens);
        tracing::info!(
            backend = ?config.store_backend,
            store_connected = state.store.is_connected(),
            "Application state initialized"
        );
        state
    }

    /// Assemble state from already-built collaborators.
    pub fn from_parts(
        store: Arc<dyn CounterStore>,
        limits: LimitTable,
        tokens: Arc<dyn TokenService>,
    ) -> Self {
        let limiter: Arc<dyn RateLimiter> = Arc::new(QuotaEngine::new(store.clone(), limits.clone()));

        Self {
            store,
            limiter,
            limits: Arc::new(limits),
            tokens,
        }
    }

    async fn build_store(config: &AppConfig) -> Arc<dyn CounterStore> {
        match config.store_backend {
            #[cfg(feature = "redis")]
            StoreBackend::Redis => {
                Arc::new(marker_infra::RedisCounterStore::connect(config.redis.clone()).await)
            }
            #[cfg(not(feature = "redis"))]
            StoreBackend::Redis => {
                tracing::warn!("Built without redis feature - using in-memory counter store");
                Arc::new(InMemoryCounterStore::new())
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory counter store - limits are per-process");
                Arc::new(InMemoryCounterStore::new())
            }
        }
    }
}
