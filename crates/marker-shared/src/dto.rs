//! Data Transfer Objects - request/response types for the API.

use serde::{Deserialize, Serialize};

/// One configured rate limit tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitTier {
    /// `read`, `write` or `sensitive`.
    pub operation: String,
    pub requests_per_minute: u32,
    pub requests_per_day: u32,
}

/// Rate limit tiers that apply to the calling credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsResponse {
    /// `pat` or `session`.
    pub auth_class: String,
    pub tiers: Vec<LimitTier>,
}

/// Service health. `degraded` means quota enforcement is off because the
/// counter store is unreachable; requests are still served.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    /// `connected` or `unavailable`.
    pub store: String,
}
