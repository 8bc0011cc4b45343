//! Admission policy: the limit, window and backoff knobs for one quota pool.

use serde::{Deserialize, Serialize};

use super::key::GLOBAL_SCOPE;
use crate::error::{QuotagateError, Result};

/// Default number of requests admitted per window.
pub const DEFAULT_LIMIT: u64 = 10;
/// Default base window length in milliseconds.
pub const DEFAULT_WINDOW_MS: u64 = 60_000;
/// Default cap on window growth for repeat offenders.
pub const DEFAULT_MAX_BACKOFF_MULTIPLIER: u64 = 8;

/// A validated admission policy.
///
/// Construction is the only place policy values are checked; once a policy
/// exists, every admission decision made with it is infallible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionPolicy {
    limit: u64,
    window_ms: u64,
    route_key: String,
    max_backoff_multiplier: u64,
}

impl AdmissionPolicy {
    /// Build a policy, rejecting zero values and windows that cannot be
    /// represented once fully backed off.
    pub fn new(
        limit: u64,
        window_ms: u64,
        route_key: impl Into<String>,
        max_backoff_multiplier: u64,
    ) -> Result<Self> {
        if limit == 0 {
            return Err(invalid("limit", "must be greater than zero"));
        }
        if window_ms == 0 {
            return Err(invalid("window_ms", "must be greater than zero"));
        }
        if max_backoff_multiplier == 0 {
            return Err(invalid("max_backoff_multiplier", "must be greater than zero"));
        }

        // now + window * multiplier must stay inside an i64 of epoch millis.
        let longest = window_ms
            .checked_mul(max_backoff_multiplier)
            .filter(|w| *w <= (i64::MAX / 2) as u64);
        if longest.is_none() {
            return Err(invalid(
                "window_ms",
                format!(
                    "{} ms multiplied by backoff cap {} overflows",
                    window_ms, max_backoff_multiplier
                ),
            ));
        }

        let route_key = route_key.into();
        let route_key = if route_key.trim().is_empty() {
            GLOBAL_SCOPE.to_string()
        } else {
            route_key.trim().to_string()
        };

        Ok(Self {
            limit,
            window_ms,
            route_key,
            max_backoff_multiplier,
        })
    }

    /// Maximum requests admitted per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Base window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Resource scope used for key composition.
    pub fn route_key(&self) -> &str {
        &self.route_key
    }

    /// Cap on window-length growth.
    pub fn max_backoff_multiplier(&self) -> u64 {
        self.max_backoff_multiplier
    }

    /// The same policy applied to a different resource scope.
    pub fn for_route(&self, route_key: &str) -> Self {
        let route_key = route_key.trim();
        Self {
            route_key: if route_key.is_empty() {
                GLOBAL_SCOPE.to_string()
            } else {
                route_key.to_string()
            },
            ..self.clone()
        }
    }

    /// Highest violation streak worth storing: `ceil(log2(max_multiplier))`.
    pub fn max_streak(&self) -> u32 {
        max_streak(self.max_backoff_multiplier)
    }

    /// Window multiplier for a bucket opened with `streak` prior violations.
    pub fn multiplier(&self, streak: u32) -> u64 {
        backoff_multiplier(streak, self.max_backoff_multiplier)
    }

    /// Window length in milliseconds for a bucket opened with `streak`.
    pub fn window_for_streak(&self, streak: u32) -> u64 {
        self.window_ms * self.multiplier(streak)
    }

    /// Longest window this policy can produce, in milliseconds.
    pub fn longest_window_ms(&self) -> u64 {
        self.window_for_streak(self.max_streak())
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window_ms: DEFAULT_WINDOW_MS,
            route_key: GLOBAL_SCOPE.to_string(),
            max_backoff_multiplier: DEFAULT_MAX_BACKOFF_MULTIPLIER,
        }
    }
}

/// `min(2^streak, max_multiplier)`, saturating.
pub fn backoff_multiplier(streak: u32, max_multiplier: u64) -> u64 {
    1u64.checked_shl(streak)
        .unwrap_or(u64::MAX)
        .min(max_multiplier)
}

/// `ceil(log2(max_multiplier))`, with 0 for caps of 1 or less.
pub fn max_streak(max_multiplier: u64) -> u32 {
    if max_multiplier <= 1 {
        0
    } else {
        u64::BITS - (max_multiplier - 1).leading_zeros()
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> QuotagateError {
    QuotagateError::InvalidPolicy {
        field,
        reason: reason.into(),
    }
}

/// Policy fields as they appear in configuration files. Unset fields
/// inherit from a parent policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverrides {
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub window_ms: Option<u64>,
    #[serde(default)]
    pub route_key: Option<String>,
    #[serde(default)]
    pub max_backoff_multiplier: Option<u64>,
}

impl PolicyOverrides {
    /// Resolve against `base`, validating the result.
    pub fn resolve(&self, base: &AdmissionPolicy) -> Result<AdmissionPolicy> {
        AdmissionPolicy::new(
            self.limit.unwrap_or(base.limit),
            self.window_ms.unwrap_or(base.window_ms),
            self.route_key.clone().unwrap_or_else(|| base.route_key.clone()),
            self.max_backoff_multiplier
                .unwrap_or(base.max_backoff_multiplier),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_default_policy() {
        let policy = AdmissionPolicy::default();
        assert_eq!(policy.limit(), 10);
        assert_eq!(policy.window_ms(), 60_000);
        assert_eq!(policy.route_key(), "global");
        assert_eq!(policy.max_backoff_multiplier(), 8);
    }

    #[test]
    fn test_zero_values_rejected() {
        assert_err!(AdmissionPolicy::new(0, 1_000, "global", 8));
        assert_err!(AdmissionPolicy::new(5, 0, "global", 8));
        assert_err!(AdmissionPolicy::new(5, 1_000, "global", 0));
        assert_ok!(AdmissionPolicy::new(5, 1_000, "global", 1));
    }

    #[test]
    fn test_overflowing_window_rejected() {
        let err = AdmissionPolicy::new(5, u64::MAX / 2, "global", 8).unwrap_err();
        assert!(matches!(
            err,
            QuotagateError::InvalidPolicy {
                field: "window_ms",
                ..
            }
        ));
    }

    #[test]
    fn test_blank_route_becomes_global() {
        let policy = AdmissionPolicy::new(5, 1_000, "  ", 8).unwrap();
        assert_eq!(policy.route_key(), "global");
        assert_eq!(policy.for_route("").route_key(), "global");
        assert_eq!(policy.for_route("login").route_key(), "login");
    }

    #[test]
    fn test_backoff_multiplier_is_capped() {
        assert_eq!(backoff_multiplier(0, 8), 1);
        assert_eq!(backoff_multiplier(1, 8), 2);
        assert_eq!(backoff_multiplier(2, 8), 4);
        assert_eq!(backoff_multiplier(3, 8), 8);
        assert_eq!(backoff_multiplier(10, 8), 8);
        assert_eq!(backoff_multiplier(200, 8), 8);
        assert_eq!(backoff_multiplier(3, 5), 5);
    }

    #[test]
    fn test_max_streak() {
        assert_eq!(max_streak(1), 0);
        assert_eq!(max_streak(2), 1);
        assert_eq!(max_streak(5), 3);
        assert_eq!(max_streak(8), 3);
        assert_eq!(max_streak(9), 4);
    }

    #[test]
    fn test_window_for_streak() {
        let policy = AdmissionPolicy::default();
        assert_eq!(policy.window_for_streak(0), 60_000);
        assert_eq!(policy.window_for_streak(3), 480_000);
        assert_eq!(policy.window_for_streak(policy.max_streak()), 480_000);
        assert_eq!(policy.longest_window_ms(), 480_000);
    }

    #[test]
    fn test_overrides_inherit_from_base() {
        let base = AdmissionPolicy::default();
        let overrides = PolicyOverrides {
            limit: Some(3),
            ..Default::default()
        };

        let policy = overrides.resolve(&base).unwrap();
        assert_eq!(policy.limit(), 3);
        assert_eq!(policy.window_ms(), base.window_ms());
        assert_eq!(policy.max_backoff_multiplier(), 8);

        let bad = PolicyOverrides {
            window_ms: Some(0),
            ..Default::default()
        };
        assert_err!(bad.resolve(&base));
    }
}
