//! # Marker Infrastructure
//!
//! Concrete implementations of the ports defined in `marker-core`:
//! counter stores, the quota engine and token handling.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory store only
//! - `auth` - JWT access tokens
//! - `redis` - Redis counter store with Lua window scripts

pub mod rate_limit;
pub mod store;

#[cfg(feature = "auth")]
pub mod auth;

// Re-exports - In-Memory
pub use rate_limit::QuotaEngine;
pub use store::InMemoryCounterStore;

#[cfg(feature = "auth")]
pub use auth::{JwtConfig, JwtTokenService};

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use store::{RedisConfig, RedisCounterStore};
