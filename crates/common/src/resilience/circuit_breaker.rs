//! Per-service two-state circuit breakers
//!
//! Each service key owns one breaker holding a consecutive-failure counter.
//! The breaker is open exactly when the counter has reached
//! [`FAILURE_THRESHOLD`]. Any recorded success, or an explicit reset, closes
//! it again. There is no time-based recovery.
//!
//! Breakers are created lazily on first use and kept for the lifetime of the
//! registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{info, warn};

use super::constants::FAILURE_THRESHOLD;

//==============================================================================
// State
//==============================================================================

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
}

impl CircuitState {
    fn from_failures(failures: u32) -> Self {
        if failures >= FAILURE_THRESHOLD {
            Self::Open
        } else {
            Self::Closed
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
        }
    }
}

/// Snapshot of one service's breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerStatus {
    /// Consecutive failures since the last success or reset
    pub failures: u32,
    /// Current state
    pub state: CircuitState,
    /// Failures recorded over the breaker's lifetime
    pub total_failures: u64,
    /// Successes recorded over the breaker's lifetime
    pub total_successes: u64,
    /// Number of CLOSED -> OPEN transitions
    pub times_opened: u64,
}

#[derive(Debug, Default)]
struct ServiceBreaker {
    failures: AtomicU32,
    total_failures: AtomicU64,
    total_successes: AtomicU64,
    times_opened: AtomicU64,
}

impl ServiceBreaker {
    fn status(&self) -> BreakerStatus {
        let failures = self.failures.load(Ordering::Acquire);
        BreakerStatus {
            failures,
            state: CircuitState::from_failures(failures),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            times_opened: self.times_opened.load(Ordering::Relaxed),
        }
    }
}

//==============================================================================
// Registry
//==============================================================================

/// Circuit breakers keyed by service
///
/// # Examples
///
/// ```rust
/// use outbound_common::resilience::CircuitBreakerRegistry;
///
/// let breakers = CircuitBreakerRegistry::new();
/// for _ in 0..5 {
///     breakers.record_failure("payments-api");
/// }
/// assert!(breakers.is_open("payments-api"));
///
/// breakers.record_success("payments-api");
/// assert!(!breakers.is_open("payments-api"));
/// ```
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<ServiceBreaker>>,
}

impl CircuitBreakerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn breaker(&self, service: &str) -> Arc<ServiceBreaker> {
        if let Some(existing) = self.breakers.get(service) {
            return Arc::clone(existing.value());
        }
        Arc::clone(self.breakers.entry(service.to_string()).or_default().value())
    }

    /// Record a successful call, closing the breaker
    pub fn record_success(&self, service: &str) {
        let breaker = self.breaker(service);
        breaker.total_successes.fetch_add(1, Ordering::Relaxed);

        let previous = breaker.failures.swap(0, Ordering::AcqRel);
        if previous >= FAILURE_THRESHOLD {
            info!(service = %service, failures = previous, "Circuit breaker closed after success");
        }
    }

    /// Record a failed call; opens the breaker on the threshold crossing
    ///
    /// Returns the consecutive failure count after this failure.
    pub fn record_failure(&self, service: &str) -> u32 {
        let breaker = self.breaker(service);
        breaker.total_failures.fetch_add(1, Ordering::Relaxed);

        let previous = breaker
            .failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_add(1)))
            .unwrap_or_else(|current| current);
        let failures = previous.saturating_add(1);
        if previous < FAILURE_THRESHOLD && failures == FAILURE_THRESHOLD {
            breaker.times_opened.fetch_add(1, Ordering::Relaxed);
            warn!(service = %service, failures, "Circuit breaker opened");
        }
        failures
    }

    /// Whether the breaker for `service` is open
    ///
    /// Unknown services are closed; this does not create a breaker.
    pub fn is_open(&self, service: &str) -> bool {
        self.breakers
            .get(service)
            .is_some_and(|b| b.failures.load(Ordering::Acquire) >= FAILURE_THRESHOLD)
    }

    /// Current state for one service
    pub fn state(&self, service: &str) -> CircuitState {
        if self.is_open(service) {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    /// Consecutive failures recorded for one service
    pub fn failure_count(&self, service: &str) -> u32 {
        self.breakers.get(service).map_or(0, |b| b.failures.load(Ordering::Acquire))
    }

    /// Reset one service's breaker to closed
    pub fn reset(&self, service: &str) {
        if let Some(breaker) = self.breakers.get(service) {
            breaker.failures.store(0, Ordering::Release);
            info!(service = %service, "Circuit breaker manually reset to closed state");
        }
    }

    /// Reset every known breaker to closed
    pub fn reset_all(&self) {
        for entry in &self.breakers {
            entry.value().failures.store(0, Ordering::Release);
        }
        info!(services = self.breakers.len(), "All circuit breakers reset");
    }

    /// Snapshot of every known breaker, sorted by service
    pub fn status(&self) -> BTreeMap<String, BreakerStatus> {
        self.breakers.iter().map(|entry| (entry.key().clone(), entry.value().status())).collect()
    }
}
