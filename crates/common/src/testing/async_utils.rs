//! Async polling helpers
//!
//! Limiter tests need to know when a waiter has actually joined a queue
//! before they act on it. These helpers poll until a condition holds.

#![allow(clippy::missing_panics_doc)]

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::resilience::ConcurrencyLimiter;

/// Poll `condition` every `interval` until it returns true or `timeout`
/// elapses
///
/// Returns whether the condition was met. Uses the tokio clock, so it works
/// under `start_paused` runtimes.
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }

    false
}

/// Wait until `service` has at least `pending` queued waiters
pub async fn wait_for_pending(
    limiter: &ConcurrencyLimiter,
    service: &str,
    pending: usize,
    timeout: Duration,
) -> bool {
    poll_until(timeout, Duration::from_millis(1), || {
        let reached =
            limiter.stats_for(service).is_some_and(|stats| stats.pending >= pending);
        std::future::ready(reached)
    })
    .await
}
