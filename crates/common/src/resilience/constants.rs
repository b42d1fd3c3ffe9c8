// Constants for the resilience core
use std::time::Duration;

/// Consecutive failures that trip a service's circuit breaker
pub const FAILURE_THRESHOLD: u32 = 5;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(1000);

/// Default maximum delay cap
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);

/// Default jitter factor (0.0 = no jitter, 1.0 = up to one extra base delay)
pub const DEFAULT_JITTER_FACTOR: f64 = 0.3;

/// Maximum exponent for exponential backoff calculation to prevent overflow
pub const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Maximum allowed max_retries value
pub const MAX_RETRIES_LIMIT: u32 = 100;

/// Default per-service concurrency limit
pub const DEFAULT_CONCURRENCY: usize = 5;
