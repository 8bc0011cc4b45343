//! Removal of expired buckets.
//!
//! Sweeping only bounds memory. A bucket that survives past its reset is
//! replaced on its next lookup, so decisions never depend on sweep timing.
//! Buckets with a violation streak are kept for a grace period after their
//! reset so the streak reaches the caller's next window.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::clock::Clock;
use super::store::WindowStore;

/// Opportunistic sweeper run on the admission path.
#[derive(Debug)]
pub struct Janitor {
    /// Minimum spacing between sweeps; 0 sweeps on every call
    sweep_interval_ms: i64,
    /// When the last sweep started, `None` before the first
    last_sweep: Mutex<Option<i64>>,
}

impl Janitor {
    /// Create a janitor that sweeps at most once per `sweep_interval_ms`.
    pub fn new(sweep_interval_ms: u64) -> Self {
        Self {
            sweep_interval_ms: i64::try_from(sweep_interval_ms).unwrap_or(i64::MAX),
            last_sweep: Mutex::new(None),
        }
    }

    /// Sweep `store` if the interval has elapsed.
    ///
    /// Never waits: if another caller is already sweeping, this returns
    /// `None` immediately.
    pub fn maybe_sweep(&self, store: &dyn WindowStore, now: i64) -> Option<usize> {
        let mut last = self.last_sweep.try_lock()?;

        if let Some(previous) = *last {
            if now.saturating_sub(previous) < self.sweep_interval_ms {
                return None;
            }
        }
        *last = Some(now);

        let removed = store.sweep(now);
        if removed > 0 {
            debug!(removed = removed, remaining = store.len(), "Swept expired buckets");
        } else {
            trace!("Sweep found no expired buckets");
        }
        Some(removed)
    }
}

impl Default for Janitor {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Run a sweep every `interval` on the tokio runtime.
///
/// Covers keys that are seen once and never again, which opportunistic
/// sweeping alone would leave behind until unrelated traffic arrives. Abort
/// the returned handle to stop it.
pub fn spawn_background_sweeper(
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) -> JoinHandle<()> {
    debug!(interval_ms = interval.as_millis() as u64, "Starting background sweeper");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let removed = store.sweep(clock.now_ms());
            if removed > 0 {
                debug!(removed = removed, "Background sweep removed expired buckets");
            }
        }
    })
}
