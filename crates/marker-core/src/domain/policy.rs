//! Rate limit policy: the limit table and request classification.
//!
//! Changing a limit or marking a new endpoint sensitive is a code change
//! and ships with a redeploy.

use std::collections::HashMap;

use super::quota::{AuthClass, OperationClass};

/// Limits for one (auth class, operation class) combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    pub requests_per_minute: u32,
    pub requests_per_day: u32,
}

impl LimitPolicy {
    pub const fn new(requests_per_minute: u32, requests_per_day: u32) -> Self {
        Self {
            requests_per_minute,
            requests_per_day,
        }
    }
}

/// Endpoints that reach out to third parties or are otherwise expensive.
/// Entries are `(method, path)` with the query string removed.
pub const SENSITIVE_ENDPOINTS: &[(&str, &str)] = &[("GET", "/bookmarks/fetch-metadata")];

/// Classify a request from its method and path.
///
/// The query string is ignored, so `/bookmarks/fetch-metadata?url=...`
/// classifies the same as `/bookmarks/fetch-metadata`.
pub fn classify(method: &str, path: &str) -> OperationClass {
    let path = path.split_once('?').map_or(path, |(p, _)| p);

    let sensitive = SENSITIVE_ENDPOINTS
        .iter()
        .any(|(m, p)| m.eq_ignore_ascii_case(method) && *p == path);

    if sensitive {
        OperationClass::Sensitive
    } else if method.eq_ignore_ascii_case("GET") {
        OperationClass::Read
    } else {
        OperationClass::Write
    }
}

/// Immutable mapping from (auth class, operation class) to limits.
///
/// A missing entry means the combination is not permitted at all; the
/// authentication layer rejects it before the limiter runs.
#[derive(Debug, Clone)]
pub struct LimitTable {
    entries: HashMap<(AuthClass, OperationClass), LimitPolicy>,
}

impl LimitTable {
    pub fn new(entries: impl IntoIterator<Item = ((AuthClass, OperationClass), LimitPolicy)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, auth_class: AuthClass, operation: OperationClass) -> Option<LimitPolicy> {
        self.entries.get(&(auth_class, operation)).copied()
    }

    /// Configured tiers for one auth class, in read/write/sensitive order.
    pub fn for_auth_class(&self, auth_class: AuthClass) -> Vec<(OperationClass, LimitPolicy)> {
        [
            OperationClass::Read,
            OperationClass::Write,
            OperationClass::Sensitive,
        ]
        .into_iter()
        .filter_map(|op| self.get(auth_class, op).map(|policy| (op, policy)))
        .collect()
    }
}

impl Default for LimitTable {
    fn default() -> Self {
        use AuthClass::{InteractiveSession, PersonalToken};
        use OperationClass::{Read, Sensitive, Write};

        // Read and write share one daily pool per subject; sensitive has its own.
        Self::new([
            ((PersonalToken, Read), LimitPolicy::new(120, 2000)),
            ((PersonalToken, Write), LimitPolicy::new(60, 2000)),
            // PersonalToken + Sensitive is rejected with 403 before limiting.
            ((InteractiveSession, Read), LimitPolicy::new(300, 4000)),
            ((InteractiveSession, Write), LimitPolicy::new(90, 4000)),
            ((InteractiveSession, Sensitive), LimitPolicy::new(30, 250)),
        ])
    }
}
