//! Quota identities and decisions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Seconds in the per-minute sliding window.
pub const MINUTE_WINDOW_SECS: u64 = 60;

/// Seconds in the per-day fixed window.
pub const DAY_WINDOW_SECS: u64 = 86_400;

/// How the caller authenticated. Selects the limit tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthClass {
    /// Long-lived personal access token (scripts, CLI, integrations).
    #[serde(rename = "pat")]
    PersonalToken,
    /// Browser session from the interactive login flow.
    #[serde(rename = "session")]
    InteractiveSession,
}

impl AuthClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthClass::PersonalToken => "pat",
            AuthClass::InteractiveSession => "session",
        }
    }
}

impl fmt::Display for AuthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pat" => Ok(AuthClass::PersonalToken),
            "session" => Ok(AuthClass::InteractiveSession),
            other => Err(format!("unknown auth class: {other}")),
        }
    }
}

/// Sensitivity of a request, derived from its method and path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationClass {
    Read,
    Write,
    /// External HTTP calls and other expensive work.
    Sensitive,
}

impl OperationClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationClass::Read => "read",
            OperationClass::Write => "write",
            OperationClass::Sensitive => "sensitive",
        }
    }

    /// Daily pool this operation draws from.
    pub fn daily_pool(&self) -> DailyPool {
        match self {
            OperationClass::Sensitive => DailyPool::Sensitive,
            OperationClass::Read | OperationClass::Write => DailyPool::General,
        }
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grouping for the daily cap. Reads and writes share `General`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DailyPool {
    General,
    Sensitive,
}

impl DailyPool {
    pub fn as_str(&self) -> &'static str {
        match self {
            DailyPool::General => "general",
            DailyPool::Sensitive => "sensitive",
        }
    }
}

/// Store key for one quota window of one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaKey {
    Minute {
        subject_id: i64,
        auth_class: AuthClass,
        operation: OperationClass,
    },
    Daily {
        subject_id: i64,
        pool: DailyPool,
    },
}

impl QuotaKey {
    pub fn minute(subject_id: i64, auth_class: AuthClass, operation: OperationClass) -> Self {
        QuotaKey::Minute {
            subject_id,
            auth_class,
            operation,
        }
    }

    pub fn daily(subject_id: i64, operation: OperationClass) -> Self {
        QuotaKey::Daily {
            subject_id,
            pool: operation.daily_pool(),
        }
    }
}

impl fmt::Display for QuotaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaKey::Minute {
                subject_id,
                auth_class,
                operation,
            } => write!(f, "rate:{subject_id}:{auth_class}:{operation}:min"),
            QuotaKey::Daily { subject_id, pool } => {
                write!(f, "rate:{subject_id}:daily:{}", pool.as_str())
            }
        }
    }
}

/// Outcome of a quota check, with everything the response headers need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    /// Maximum requests in the reported window.
    pub limit: u32,
    /// Requests left in the reported window.
    pub remaining: u32,
    /// Unix timestamp at which the reported window resets (0 when unknown).
    pub reset_epoch_seconds: i64,
    /// Seconds until a retry may succeed. Zero for allowed decisions.
    pub retry_after_seconds: u64,
}

impl QuotaDecision {
    pub fn allowed(limit: u32, remaining: u32, reset_epoch_seconds: i64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: remaining.min(limit),
            reset_epoch_seconds,
            retry_after_seconds: 0,
        }
    }

    /// Denied decision. `retry_after_seconds` is clamped to at least one second.
    pub fn denied(limit: u32, reset_epoch_seconds: i64, retry_after_seconds: u64) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_epoch_seconds,
            retry_after_seconds: retry_after_seconds.max(1),
        }
    }

    /// Permissive decision for a combination with no configured policy.
    pub fn unconfigured() -> Self {
        Self::allowed(0, 0, 0)
    }

    /// Permissive decision used when the counter store cannot answer.
    pub fn fail_open(limit: u32) -> Self {
        Self::allowed(limit, limit, 0)
    }

    /// Turn a denial into a [`QuotaExceeded`](crate::error::QuotaExceeded) error.
    pub fn into_result(self) -> Result<Self, crate::error::QuotaExceeded> {
        if self.allowed {
            Ok(self)
        } else {
            Err(crate::error::QuotaExceeded { decision: self })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minute_key_format() {
        let key = QuotaKey::minute(42, AuthClass::InteractiveSession, OperationClass::Sensitive);
        assert_eq!(key.to_string(), "rate:42:session:sensitive:min");
    }

    #[test]
    fn test_daily_key_pools() {
        assert_eq!(
            QuotaKey::daily(7, OperationClass::Read).to_string(),
            "rate:7:daily:general"
        );
        assert_eq!(
            QuotaKey::daily(7, OperationClass::Write),
            QuotaKey::daily(7, OperationClass::Read)
        );
        assert_eq!(
            QuotaKey::daily(7, OperationClass::Sensitive).to_string(),
            "rate:7:daily:sensitive"
        );
    }

    #[test]
    fn test_denied_decision_always_has_retry_after() {
        let decision = QuotaDecision::denied(10, 0, 0);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after_seconds, 1);
    }

    #[test]
    fn test_allowed_decision_caps_remaining() {
        let decision = QuotaDecision::allowed(5, 9, 100);
        assert_eq!(decision.remaining, 5);
        assert_eq!(decision.retry_after_seconds, 0);
    }

    #[test]
    fn test_into_result() {
        assert!(QuotaDecision::fail_open(30).into_result().is_ok());

        let err = QuotaDecision::denied(30, 1_000, 12).into_result().unwrap_err();
        assert_eq!(err.decision.retry_after_seconds, 12);
    }

    #[test]
    fn test_auth_class_round_trips_through_str() {
        for class in [AuthClass::PersonalToken, AuthClass::InteractiveSession] {
            assert_eq!(class.as_str().parse::<AuthClass>().unwrap(), class);
        }
        assert!("auth0".parse::<AuthClass>().is_err());
    }

    #[test]
    fn test_operation_class_serializes_lowercase() {
        let json = serde_json::to_string(&OperationClass::Sensitive).unwrap();
        assert_eq!(json, "\"sensitive\"");
    }
}
