//! Concurrency probe for bulkhead tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Tracks how many operations run at once and the highest count seen
///
/// Call [`enter`](Self::enter) at the start of an operation and keep the
/// guard alive until it finishes.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyProbe {
    inner: Arc<ProbeCounters>,
}

#[derive(Debug, Default)]
struct ProbeCounters {
    current: AtomicUsize,
    high_water: AtomicUsize,
    completed: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one operation as running
    pub fn enter(&self) -> ProbeGuard {
        let now = self.inner.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.high_water.fetch_max(now, Ordering::SeqCst);
        ProbeGuard { inner: Arc::clone(&self.inner) }
    }

    /// Operations running right now
    pub fn current(&self) -> usize {
        self.inner.current.load(Ordering::SeqCst)
    }

    /// Highest number of operations seen running at once
    pub fn high_water_mark(&self) -> usize {
        self.inner.high_water.load(Ordering::SeqCst)
    }

    /// Operations that have finished
    pub fn completed(&self) -> usize {
        self.inner.completed.load(Ordering::SeqCst)
    }
}

/// Marks the end of an operation when dropped
#[derive(Debug)]
pub struct ProbeGuard {
    inner: Arc<ProbeCounters>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.inner.current.fetch_sub(1, Ordering::SeqCst);
        self.inner.completed.fetch_add(1, Ordering::SeqCst);
    }
}
