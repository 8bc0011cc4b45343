//! Quota feedback headers.

use serde::{Deserialize, Serialize};

/// Requests allowed per window.
pub const LIMIT_HEADER: &str = "X-RateLimit-Limit";
/// Requests left in the current window.
pub const REMAINING_HEADER: &str = "X-RateLimit-Remaining";
/// Window end in Unix seconds, rounded up.
pub const RESET_HEADER: &str = "X-RateLimit-Reset";
/// Whole seconds to wait before retrying; sent only on a denial.
pub const RETRY_AFTER_HEADER: &str = "Retry-After";

/// Transport-agnostic response headers describing quota state.
///
/// Callers attach these verbatim to their outbound response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitHeaders {
    #[serde(rename = "X-RateLimit-Limit")]
    pub limit: String,
    #[serde(rename = "X-RateLimit-Remaining")]
    pub remaining: String,
    /// Unix seconds
    #[serde(rename = "X-RateLimit-Reset")]
    pub reset: String,
    /// Seconds until reset; only present on a denial
    #[serde(rename = "Retry-After", default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<String>,
}

impl RateLimitHeaders {
    /// Render a decision.
    ///
    /// `reset_at` and `now` are epoch milliseconds. The reset instant is
    /// rounded up to whole seconds so callers never retry early, and
    /// `Retry-After` is at least one second.
    pub fn build(limit: u64, remaining: u64, reset_at: i64, blocked: bool, now: i64) -> Self {
        let retry_after = blocked.then(|| ceil_secs(reset_at - now).max(1).to_string());

        Self {
            limit: limit.to_string(),
            remaining: remaining.to_string(),
            reset: ceil_secs(reset_at).to_string(),
            retry_after,
        }
    }

    /// Look up a header value by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Header name/value pairs in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            (LIMIT_HEADER, Some(self.limit.as_str())),
            (REMAINING_HEADER, Some(self.remaining.as_str())),
            (RESET_HEADER, Some(self.reset.as_str())),
            (RETRY_AFTER_HEADER, self.retry_after.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
    }
}

fn ceil_secs(ms: i64) -> i64 {
    (ms + 999).div_euclid(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_headers_have_no_retry_after() {
        let headers = RateLimitHeaders::build(10, 9, 61_000, false, 1_000);

        assert_eq!(headers.limit, "10");
        assert_eq!(headers.remaining, "9");
        assert_eq!(headers.reset, "61");
        assert!(headers.retry_after.is_none());
        assert_eq!(headers.get("retry-after"), None);
        assert_eq!(headers.iter().count(), 3);
    }

    #[test]
    fn test_blocked_headers_carry_retry_after() {
        let headers = RateLimitHeaders::build(2, 0, 1_000, true, 20);
        assert_eq!(headers.get(RETRY_AFTER_HEADER), Some("1"));
        assert_eq!(headers.get("x-ratelimit-remaining"), Some("0"));

        let headers = RateLimitHeaders::build(2, 0, 480_000, true, 1_500);
        assert_eq!(headers.retry_after.as_deref(), Some("479"));
    }

    #[test]
    fn test_retry_after_is_at_least_one_second() {
        let headers = RateLimitHeaders::build(2, 0, 1_000, true, 1_000);
        assert_eq!(headers.retry_after.as_deref(), Some("1"));
    }

    #[test]
    fn test_reset_rounds_up_to_whole_seconds() {
        assert_eq!(RateLimitHeaders::build(1, 0, 1_700_000_000_001, false, 0).reset, "1700000001");
        assert_eq!(RateLimitHeaders::build(1, 0, 1_700_000_000_000, false, 0).reset, "1700000000");
    }

    #[test]
    fn test_json_shape() {
        let headers = RateLimitHeaders::build(5, 0, 3_000, true, 0);
        let json = serde_json::to_value(&headers).unwrap();

        assert_eq!(json["X-RateLimit-Limit"], "5");
        assert_eq!(json["X-RateLimit-Remaining"], "0");
        assert_eq!(json["X-RateLimit-Reset"], "3");
        assert_eq!(json["Retry-After"], "3");

        let allowed = RateLimitHeaders::build(5, 4, 3_000, false, 0);
        let json = serde_json::to_value(&allowed).unwrap();
        assert!(json.get("Retry-After").is_none());
    }
}
