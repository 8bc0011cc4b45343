//! Fixed-window bucket with exponential backoff for repeat offenders.

use super::policy::AdmissionPolicy;

/// Per-key quota state for one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// Composite `{identity}:{scope}` key
    pub key: String,
    /// Requests observed in the current window, always at least 1
    pub count: u64,
    /// Epoch millis at which this window ends
    pub reset_at: i64,
    /// Consecutive windows that ended over the limit, capped
    pub violation_streak: u32,
    /// Whether this window has already been charged to the streak
    violated: bool,
    /// Epoch millis until which the store must keep this bucket so its
    /// streak can be carried into the next window
    retain_until: i64,
}

/// Outcome of a single admission evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u64,
    /// Epoch millis at which the current window ends
    pub reset_at: i64,
}

impl Bucket {
    /// Open a new window for `key` at `now`, carrying `violation_streak`
    /// from the previous generation.
    ///
    /// The window length is fixed here and never changes while the bucket
    /// lives.
    pub fn open(key: &str, now: i64, violation_streak: u32, policy: &AdmissionPolicy) -> Self {
        let streak = violation_streak.min(policy.max_streak());
        let window_ms = policy.window_for_streak(streak) as i64;

        let mut bucket = Self {
            key: key.to_string(),
            count: 1,
            reset_at: now.saturating_add(window_ms),
            violation_streak: streak,
            violated: false,
            retain_until: 0,
        };
        bucket.update_retention(policy);
        bucket
    }

    /// A bucket is dead once `now` reaches its reset instant.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.reset_at
    }

    /// Whether the store may drop this bucket at `now`.
    ///
    /// A bucket with no streak goes at its reset instant. A bucket with a
    /// streak stays for one fully backed-off window past its reset so a
    /// returning offender still has its streak carried forward.
    pub fn is_reclaimable(&self, now: i64) -> bool {
        now >= self.retain_until
    }

    /// Epoch millis from which the store may drop this bucket.
    pub fn retain_until(&self) -> i64 {
        self.retain_until
    }

    /// Decision for the request that produced this bucket state.
    pub fn decision(&self, policy: &AdmissionPolicy) -> Decision {
        Decision {
            allowed: self.count <= policy.limit(),
            remaining: policy.limit().saturating_sub(self.count),
            reset_at: self.reset_at,
        }
    }

    /// Count one more request against a live window.
    ///
    /// Going over the limit charges the streak once per window. The reset
    /// instant is left alone so a denied caller recovers on schedule; the
    /// penalty only lengthens the next window.
    pub fn record_hit(&mut self, policy: &AdmissionPolicy) {
        self.count = self.count.saturating_add(1);

        if self.count > policy.limit() && !self.violated {
            self.violated = true;
            self.violation_streak = (self.violation_streak + 1).min(policy.max_streak());
            self.update_retention(policy);
        }
    }

    /// Whether this window has gone over the limit.
    pub fn violated(&self) -> bool {
        self.violated
    }

    fn update_retention(&mut self, policy: &AdmissionPolicy) {
        self.retain_until = if self.violation_streak > 0 {
            self.reset_at.saturating_add(policy.longest_window_ms() as i64)
        } else {
            self.reset_at
        };
    }
}

/// Apply one request at `now` to whatever the store holds for `key` and
/// return the bucket to write back.
///
/// An expired or missing bucket is replaced before anything is counted
/// against it.
pub fn advance(current: Option<Bucket>, key: &str, now: i64, policy: &AdmissionPolicy) -> Bucket {
    match current {
        Some(mut bucket) if !bucket.is_expired(now) => {
            bucket.record_hit(policy);
            bucket
        }
        previous => {
            let carried = previous.map(|b| b.violation_streak).unwrap_or(0);
            Bucket::open(key, now, carried, policy)
        }
    }
}
