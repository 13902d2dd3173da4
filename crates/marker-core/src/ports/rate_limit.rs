//! Rate limiting port.

use async_trait::async_trait;

use crate::domain::{AuthClass, OperationClass, QuotaDecision};

/// Rate limiter trait - decides whether a subject may perform an operation.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check the subject's quota and record the request when admitted.
    ///
    /// Never fails: an unreachable backend yields an allowed decision.
    async fn check(
        &self,
        subject_id: i64,
        auth_class: AuthClass,
        operation: OperationClass,
    ) -> QuotaDecision;
}
