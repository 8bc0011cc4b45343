//! Core admission limiter.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace, warn};

use super::bucket::{self, Bucket, Decision};
use super::clock::{Clock, SystemClock};
use super::headers::RateLimitHeaders;
use super::identity::RequestMetadata;
use super::janitor::Janitor;
use super::key::AdmissionKey;
use super::policy::AdmissionPolicy;
use super::routes::RouteTable;
use super::store::{InMemoryWindowStore, WindowStore};
use crate::config::QuotagateConfig;
use crate::error::Result;

/// What the caller gets back for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdmissionOutcome {
    /// `true` when the request is admitted
    pub success: bool,
    /// Requests left in the current window
    pub remaining: u64,
    /// Epoch millis at which the current window ends
    #[serde(skip)]
    pub reset_at: i64,
    /// Headers to attach verbatim to the response
    pub headers: RateLimitHeaders,
}

/// Fixed-window admission limiter with backoff for repeat offenders.
///
/// This struct is thread-safe and can be shared across tasks behind an
/// `Arc`. Every decision is synchronous and never fails.
pub struct AdmissionLimiter {
    /// Bucket storage
    store: Arc<dyn WindowStore>,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Policy used when no route matches
    policy: AdmissionPolicy,
    /// Per-route policies
    routes: RouteTable,
    /// Opportunistic sweeper
    janitor: Janitor,
}

impl AdmissionLimiter {
    /// Create a limiter with an in-memory store and the system clock.
    pub fn new(policy: AdmissionPolicy) -> Self {
        Self {
            store: Arc::new(InMemoryWindowStore::new()),
            clock: Arc::new(SystemClock),
            policy,
            routes: RouteTable::new(),
            janitor: Janitor::default(),
        }
    }

    /// Build a limiter from loaded configuration.
    pub fn from_config(config: &QuotagateConfig) -> Result<Self> {
        let policy = config.default_policy()?;
        let routes = config.route_table()?;

        debug!(
            limit = policy.limit(),
            window_ms = policy.window_ms(),
            max_backoff_multiplier = policy.max_backoff_multiplier(),
            routes = routes.len(),
            "Building admission limiter"
        );

        Ok(Self::new(policy)
            .with_store(Arc::new(InMemoryWindowStore::with_capacity(
                config.janitor.store_capacity,
            )))
            .with_routes(routes)
            .with_janitor(Janitor::new(config.janitor.sweep_interval_ms)))
    }

    /// Replace the window store.
    pub fn with_store(mut self, store: Arc<dyn WindowStore>) -> Self {
        self.store = store;
        self
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the route table.
    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    /// Replace the opportunistic janitor.
    pub fn with_janitor(mut self, janitor: Janitor) -> Self {
        self.janitor = janitor;
        self
    }

    /// Check a request against the default policy.
    pub fn check(&self, metadata: &RequestMetadata) -> AdmissionOutcome {
        self.check_with(metadata, &self.policy)
    }

    /// Check a request against the policy configured for `route`, falling
    /// back to the default policy scoped to `route`.
    pub fn check_route(&self, metadata: &RequestMetadata, route: &str) -> AdmissionOutcome {
        let policy = self.policy_for_route(route);
        self.check_with(metadata, &policy)
    }

    /// Check a request against an explicit per-call policy.
    pub fn check_with(&self, metadata: &RequestMetadata, policy: &AdmissionPolicy) -> AdmissionOutcome {
        let key = AdmissionKey::new(&metadata.identity(), policy.route_key());
        let now = self.clock.now_ms();

        self.janitor.maybe_sweep(self.store.as_ref(), now);

        let decision = self.evaluate(&key.to_string_key(), now, policy);
        let headers = RateLimitHeaders::build(
            policy.limit(),
            decision.remaining,
            decision.reset_at,
            !decision.allowed,
            now,
        );

        AdmissionOutcome {
            success: decision.allowed,
            remaining: decision.remaining,
            reset_at: decision.reset_at,
            headers,
        }
    }

    /// Apply one request for `key` at `now` and return the decision.
    ///
    /// The whole read-modify-write runs under the store's per-key lock.
    pub fn evaluate(&self, key: &str, now: i64, policy: &AdmissionPolicy) -> Decision {
        trace!(key = %key, now = now, limit = policy.limit(), "Evaluating admission");

        let mut previous_streak = None;

        let next = self.store.update(key, &mut |current: Option<Bucket>| {
            previous_streak = current.as_ref().map(|b| b.violation_streak);
            bucket::advance(current, key, now, policy)
        });
        let decision = next.decision(policy);

        if next.count == 1 {
            debug!(
                key = %key,
                reset_at = next.reset_at,
                streak = next.violation_streak,
                "Opened admission window"
            );
        }

        if !decision.allowed {
            debug!(key = %key, reset_at = decision.reset_at, "Admission denied");

            let max_streak = policy.max_streak();
            if next.violation_streak == max_streak
                && previous_streak.is_some_and(|s| s < max_streak)
            {
                warn!(
                    key = %key,
                    streak = next.violation_streak,
                    max_backoff_multiplier = policy.max_backoff_multiplier(),
                    "Caller reached maximum backoff"
                );
            }
        }

        decision
    }

    /// Policy that applies to `route`.
    pub fn policy_for_route(&self, route: &str) -> AdmissionPolicy {
        self.routes
            .find(route.trim())
            .unwrap_or_else(|| self.policy.for_route(route))
    }

    /// The default policy.
    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    /// The window store.
    pub fn store(&self) -> &Arc<dyn WindowStore> {
        &self.store
    }

    /// The clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Current bucket for `key`, if any.
    pub fn bucket(&self, key: &str) -> Option<Bucket> {
        self.store.get(key)
    }

    /// Number of stored buckets.
    pub fn bucket_count(&self) -> usize {
        self.store.len()
    }

    /// Drop all buckets.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.store.clear();
    }
}

impl Default for AdmissionLimiter {
    fn default() -> Self {
        Self::new(AdmissionPolicy::default())
    }
}
