//! Per-service concurrency limiting with FIFO queueing
//!
//! The bulkhead pattern prevents resource exhaustion by limiting the number
//! of concurrent operations. Named after ship bulkheads that contain flooding
//! to specific compartments, each service key gets its own compartment: a
//! slot counter bounded by the key's limit and a FIFO queue of callers
//! waiting for a slot.
//!
//! Slots are released by dropping the [`SlotPermit`]. A released slot is
//! handed straight to the oldest waiter, so `running` never exceeds the limit
//! and waiters start in arrival order.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::cancel::{suspend, Deadline};
use super::error::{ResilienceError, ResilienceResult};

/// Snapshot of one service's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Running plus waiting callers
    pub size: usize,
    /// Callers waiting for a slot
    pub pending: usize,
    /// Callers holding a slot
    pub running: usize,
    /// The key's concurrency limit
    pub concurrency: usize,
}

#[derive(Debug)]
struct Waiter {
    id: u64,
    grant: oneshot::Sender<()>,
}

#[derive(Debug)]
struct QueueState {
    limit: usize,
    running: usize,
    waiters: VecDeque<Waiter>,
    next_id: u64,
}

#[derive(Debug)]
struct KeyQueue {
    state: Mutex<QueueState>,
}

impl KeyQueue {
    fn new(limit: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                limit,
                running: 0,
                waiters: VecDeque::new(),
                next_id: 0,
            }),
        }
    }

    /// Give a slot back: hand it to the oldest live waiter or free it.
    fn release(&self) {
        let mut state = self.state.lock();
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.grant.send(()).is_ok() {
                return;
            }
        }
        state.running = state.running.saturating_sub(1);
    }

    fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        let pending = state.waiters.len();
        QueueStats {
            size: state.running + pending,
            pending,
            running: state.running,
            concurrency: state.limit,
        }
    }
}

/// A held concurrency slot; dropping it releases the slot
#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct SlotPermit {
    queue: Arc<KeyQueue>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.queue.release();
    }
}

/// Removes a queued caller that stops waiting, or passes on a slot it was
/// granted but never used.
struct QueuedWaiter {
    queue: Arc<KeyQueue>,
    id: u64,
    grant: oneshot::Receiver<()>,
    settled: bool,
}

impl Drop for QueuedWaiter {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let mut state = self.queue.state.lock();
        if let Some(position) = state.waiters.iter().position(|w| w.id == self.id) {
            state.waiters.remove(position);
            return;
        }
        drop(state);

        // Our entry was popped while `grant` was still alive, so the send
        // succeeded and the slot is ours to give back.
        self.queue.release();
    }
}

/// Concurrency limits keyed by service
///
/// # Examples
///
/// ```rust
/// use outbound_common::resilience::ConcurrencyLimiter;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let limiter = ConcurrencyLimiter::new();
///
/// let permit = limiter.acquire("claude-api", 2).await?;
/// assert_eq!(limiter.stats()["claude-api"].running, 1);
///
/// drop(permit);
/// assert_eq!(limiter.stats()["claude-api"].running, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConcurrencyLimiter {
    queues: DashMap<String, Arc<KeyQueue>>,
}

impl ConcurrencyLimiter {
    /// Create an empty limiter
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, service: &str, concurrency: usize) -> Arc<KeyQueue> {
        let queue = match self.queues.get(service) {
            Some(existing) => Arc::clone(existing.value()),
            None => Arc::clone(
                self.queues
                    .entry(service.to_string())
                    .or_insert_with(|| Arc::new(KeyQueue::new(concurrency)))
                    .value(),
            ),
        };

        let limit = queue.state.lock().limit;
        if limit != concurrency {
            debug!(
                service = %service,
                requested = concurrency,
                limit,
                "Concurrency limit already fixed for service, keeping existing limit"
            );
        }
        queue
    }

    /// Wait for a slot on `service`
    ///
    /// The first call for a service fixes its limit.
    pub async fn acquire(&self, service: &str, concurrency: usize) -> ResilienceResult<SlotPermit> {
        self.acquire_until(service, concurrency, &CancellationToken::new(), None).await
    }

    /// Wait for a slot unless `token` is cancelled first
    pub async fn acquire_with_cancel(
        &self,
        service: &str,
        concurrency: usize,
        token: &CancellationToken,
    ) -> ResilienceResult<SlotPermit> {
        self.acquire_until(service, concurrency, token, None).await
    }

    #[instrument(level = "debug", skip(self, token, deadline))]
    pub(crate) async fn acquire_until(
        &self,
        service: &str,
        concurrency: usize,
        token: &CancellationToken,
        deadline: Option<Deadline>,
    ) -> ResilienceResult<SlotPermit> {
        if concurrency == 0 {
            return Err(ResilienceError::invalid_configuration(format!(
                "concurrency for '{service}' must be greater than 0"
            )));
        }

        let queue = self.queue(service, concurrency);
        let (id, grant, position) = {
            let mut state = queue.state.lock();
            if state.running < state.limit {
                state.running += 1;
                drop(state);
                return Ok(SlotPermit { queue });
            }

            let id = state.next_id;
            state.next_id += 1;
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(Waiter { id, grant: tx });
            (id, rx, state.waiters.len())
        };
        debug!(service = %service, position, "All slots busy, queued for a slot");

        let mut waiter = QueuedWaiter { queue: Arc::clone(&queue), id, grant, settled: false };
        match suspend(&mut waiter.grant, token, deadline).await {
            Ok(Ok(())) => {
                waiter.settled = true;
                Ok(SlotPermit { queue })
            }
            Ok(Err(_)) => {
                // Senders are only dropped after a successful hand-off
                waiter.settled = true;
                Err(ResilienceError::Cancelled { service: service.to_string() })
            }
            Err(interrupted) => Err(interrupted.into_error(service)),
        }
    }

    /// Snapshot of one service's queue
    pub fn stats_for(&self, service: &str) -> Option<QueueStats> {
        self.queues.get(service).map(|queue| queue.stats())
    }

    /// Snapshot of every known queue, sorted by service
    pub fn stats(&self) -> BTreeMap<String, QueueStats> {
        self.queues.iter().map(|entry| (entry.key().clone(), entry.value().stats())).collect()
    }
}
