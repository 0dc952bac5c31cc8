//! Periodic cleanup of expired cache entries and idle rate-limit buckets.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use super::AppState;
use crate::security::TieredRateLimiter;

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub cache_entries: usize,
    pub buckets: usize,
}

/// Runs one sweep over the cache and the limiter.
pub fn sweep(state: &AppState, limiter: &TieredRateLimiter) -> SweepReport {
    let report = SweepReport {
        cache_entries: state.cache.purge_expired(),
        buckets: limiter.prune_idle(),
    };
    debug!(
        cache_entries = report.cache_entries,
        buckets = report.buckets,
        "sweep finished"
    );
    report
}

/// Sweeps every `every` until the returned task is aborted.
///
/// `every` must be non-zero.
pub fn spawn_sweeper(
    state: Arc<AppState>,
    limiter: Arc<TieredRateLimiter>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep(&state, &limiter);
        }
    })
}
