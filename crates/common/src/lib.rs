//! Resilience core for calls into unreliable external dependencies.
//!
//! Collaborators (scraping and enrichment services) hand this crate a service
//! key and an async operation; the crate wraps the operation with bounded
//! retry, a per-service circuit breaker and a per-service concurrency limit.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: errors and serde utilities
//! - `observability`: tracing and subscriber initialisation
//! - `runtime`: async resilience core and its configuration (default)
//! - `test-utils`: helpers for exercising the core from downstream tests

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod utils;

// Observability tier
// ---------------------------------------------------------------
#[cfg(feature = "observability")]
pub mod observability;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod config;
#[cfg(feature = "runtime")]
pub mod resilience;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "runtime", feature = "test-utils"))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use config::{LimiterConfig, ResilienceConfig, ServiceOverrides};
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use resilience::{
    classify, BreakerStatus, CircuitBreakerRegistry, CircuitState, ConcurrencyLimiter,
    DependencyError, FailureClass, QueueStats, ResilienceError, ResilienceRegistry,
    ResilienceResult, ResilienceSnapshot, RetryPolicy, RetryReport, FAILURE_THRESHOLD,
};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
