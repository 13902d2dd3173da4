//! Domain types - quota identities, decisions and the limit policy.

mod policy;
mod quota;

pub use policy::{LimitPolicy, LimitTable, SENSITIVE_ENDPOINTS, classify};
pub use quota::{
    AuthClass, DAY_WINDOW_SECS, DailyPool, MINUTE_WINDOW_SECS, OperationClass, QuotaDecision,
    QuotaKey,
};
