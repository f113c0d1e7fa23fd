//! Outcome of a rate limit check

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a request may proceed, and the quota left for its scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,

    /// Quota applied to the scope
    pub limit: u32,

    pub remaining: u32,

    /// When the current window frees capacity
    pub reset_time: DateTime<Utc>,

    /// Seconds to wait before retrying; set only on rejection, always at least 1
    pub retry_after: Option<u64>,
}

impl RateLimitDecision {
    /// Unconstrained decision used for bypass and fail-open paths
    pub(crate) fn unrestricted(limit: u32, reset_time: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: limit,
            reset_time,
            retry_after: None,
        }
    }

    /// Standard rate limit response headers
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset_time.timestamp().to_string()),
        ];
        if let Some(retry_after) = self.retry_after {
            headers.push(("Retry-After", retry_after.to_string()));
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_headers_include_retry_after_only_when_denied() {
        let reset_time = Utc.timestamp_opt(1_700_000_060, 0).unwrap();
        let mut decision = RateLimitDecision::unrestricted(30, reset_time);
        assert_eq!(decision.headers().len(), 3);
        assert!(decision
            .headers()
            .contains(&("X-RateLimit-Reset", "1700000060".to_string())));

        decision.allowed = false;
        decision.remaining = 0;
        decision.retry_after = Some(12);
        let headers = decision.headers();
        assert!(headers.contains(&("Retry-After", "12".to_string())));
        assert!(headers.contains(&("X-RateLimit-Remaining", "0".to_string())));
    }
}
