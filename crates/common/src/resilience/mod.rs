//! Resilience patterns for calls into external dependencies
//!
//! This module wraps async operations with three composable behaviours:
//! - **Retry**: bounded retries with exponential backoff and jitter, skipping
//!   client errors
//! - **Circuit Breaker**: a per-service consecutive-failure counter that
//!   rejects calls once it reaches [`FAILURE_THRESHOLD`]
//! - **Bulkhead**: a per-service concurrency limit with FIFO queueing
//!
//! All state lives in a [`ResilienceRegistry`] value partitioned by service
//! key. Keys are created on first use.
//!
//! ## Cancellation
//!
//! A call can be suspended while the operation runs, while it sleeps between
//! attempts, and while it waits for a concurrency slot. The `_until` entry
//! points race all three against a `CancellationToken`, and
//! `RetryPolicy::call_timeout` sets an overall deadline. An interrupted call
//! records one failure on the service's breaker and returns
//! [`ResilienceError::Cancelled`] or [`ResilienceError::TimedOut`].

pub mod bulkhead;
mod cancel;
pub mod circuit_breaker;
pub mod classifier;
pub mod constants;
pub mod error;
pub mod registry;
pub mod retry;

pub use bulkhead::{ConcurrencyLimiter, QueueStats, SlotPermit};
pub use circuit_breaker::{BreakerStatus, CircuitBreakerRegistry, CircuitState};
pub use classifier::{classify, DependencyError, FailureClass};
pub use constants::FAILURE_THRESHOLD;
pub use error::{ResilienceError, ResilienceResult};
pub use registry::{ResilienceRegistry, ResilienceSnapshot};
pub use retry::{RetryPolicy, RetryPolicyBuilder, RetryReport};
