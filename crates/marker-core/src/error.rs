//! Domain-level error types.

use thiserror::Error;

use crate::domain::QuotaDecision;

/// A quota check denied the request. Carries the decision so the caller
/// can populate rate limit headers and the retry hint.
#[derive(Debug, Clone, Error)]
#[error("Rate limit exceeded, retry after {} seconds", .decision.retry_after_seconds)]
pub struct QuotaExceeded {
    pub decision: QuotaDecision,
}
