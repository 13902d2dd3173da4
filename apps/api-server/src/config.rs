//! Application configuration loaded from environment variables.

use std::env;

#[cfg(feature = "redis")]
use marker_infra::RedisConfig;

/// Where quota counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Shared Redis instance. Required when running more than one server.
    Redis,
    /// Process-local counters for single-instance development.
    Memory,
}

impl StoreBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "redis" => Some(StoreBackend::Redis),
            "memory" => Some(StoreBackend::Memory),
            _ => None,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store_backend: StoreBackend,
    #[cfg(feature = "redis")]
    pub redis: RedisConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let default_backend = if cfg!(feature = "redis") {
            StoreBackend::Redis
        } else {
            StoreBackend::Memory
        };

        let store_backend = match env::var("RATE_LIMIT_BACKEND") {
            Ok(value) => StoreBackend::parse(&value).unwrap_or_else(|| {
                tracing::warn!(value = %value, "Unknown RATE_LIMIT_BACKEND, using default");
                default_backend
            }),
            Err(_) => default_backend,
        };

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            store_backend,
            #[cfg(feature = "redis")]
            redis: RedisConfig::from_env(),
        }
    }
}
