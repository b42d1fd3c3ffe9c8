//! Bounded retry with exponential backoff and jitter
//!
//! The retry loop consults the service's circuit breaker before every
//! attempt, records the outcome of every attempt against it, and stops
//! immediately on client errors. Every other failure class is retried until
//! `max_retries` is spent.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::cancel::{suspend, Deadline};
use super::circuit_breaker::CircuitBreakerRegistry;
use super::classifier::{classify, DependencyError, FailureClass};
use super::constants::{
    DEFAULT_JITTER_FACTOR, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES, DEFAULT_MIN_DELAY,
    MAX_BACKOFF_EXPONENT, MAX_RETRIES_LIMIT,
};
use super::error::{ResilienceError, ResilienceResult};
use crate::utils::serde::{duration_millis, option_duration_millis};

//==============================================================================
// Policy
//==============================================================================

/// Retry behaviour for one call
///
/// Durations are written as milliseconds when serialized
/// (`min_delay_ms`, `max_delay_ms`, `call_timeout_ms`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`
    pub max_retries: u32,
    /// Base delay for the first backoff
    #[serde(rename = "min_delay_ms", with = "duration_millis")]
    pub min_delay: Duration,
    /// Cap applied to the exponential delay before jitter
    #[serde(rename = "max_delay_ms", with = "duration_millis")]
    pub max_delay: Duration,
    /// Extra random delay as a fraction of the base delay, in `[0, 1]`
    pub jitter_factor: f64,
    /// Overall deadline for the call, including waits
    #[serde(
        rename = "call_timeout_ms",
        with = "option_duration_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub call_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            call_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a policy builder
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Validate the policy
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ResilienceError::invalid_configuration(format!(
                "max_retries must be at most {MAX_RETRIES_LIMIT}, got {}",
                self.max_retries
            )));
        }

        if self.min_delay > self.max_delay {
            return Err(ResilienceError::invalid_configuration(format!(
                "min_delay ({:?}) cannot be greater than max_delay ({:?})",
                self.min_delay, self.max_delay
            )));
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ResilienceError::invalid_configuration(format!(
                "jitter_factor must be between 0.0 and 1.0, got {}",
                self.jitter_factor
            )));
        }

        if self.call_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ResilienceError::invalid_configuration(
                "call_timeout must be greater than zero",
            ));
        }

        Ok(())
    }

    /// Exponential delay for a 0-indexed attempt, without jitter
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_millis = u64::try_from(self.min_delay.as_millis()).unwrap_or(u64::MAX);
        let max_millis = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);

        // Cap exponent to prevent overflow
        let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
        let multiplier = 2_u64.saturating_pow(exponent);

        let delay_millis = base_millis.saturating_mul(multiplier).min(max_millis);
        Duration::from_millis(delay_millis)
    }

    /// Delay to sleep after the 0-indexed failed attempt, jitter included
    ///
    /// The jitter is uniform in `[0, jitter_factor * base]` and added on top
    /// of the capped base delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for_attempt(attempt);
        if self.jitter_factor.is_nan() || self.jitter_factor <= 0.0 || delay.is_zero() {
            return delay;
        }

        let jitter_range = delay.as_millis() as f64 * self.jitter_factor;
        let jitter = rand::thread_rng().gen_range(0.0..=jitter_range);

        delay + Duration::from_millis(jitter as u64)
    }

    /// Total attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Builder for RetryPolicy with fluent API
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.policy.max_retries = retries;
        self
    }

    pub fn min_delay(mut self, delay: Duration) -> Self {
        self.policy.min_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.policy.jitter_factor = factor;
        self
    }

    pub fn no_jitter(mut self) -> Self {
        self.policy.jitter_factor = 0.0;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.policy.call_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> ResilienceResult<RetryPolicy> {
        self.policy.validate()?;
        Ok(self.policy)
    }
}

//==============================================================================
// Executor
//==============================================================================

/// Summary of one retry loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    /// Times the operation was invoked
    pub attempts: u32,
    /// Backoff time actually slept
    #[serde(rename = "total_delay_ms", with = "duration_millis")]
    pub total_delay: Duration,
}

/// Run `operation` under `policy`, recording every attempt on `breakers`.
#[instrument(
    name = "retry",
    skip(breakers, policy, token, deadline, operation),
    fields(max_retries = policy.max_retries)
)]
pub(crate) async fn run_with_retry<F, Fut, T>(
    breakers: &CircuitBreakerRegistry,
    service: &str,
    policy: &RetryPolicy,
    token: &CancellationToken,
    deadline: Option<Deadline>,
    mut operation: F,
) -> (ResilienceResult<T>, RetryReport)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DependencyError>>,
{
    let mut report = RetryReport::default();
    let mut attempt: u32 = 0;

    loop {
        if breakers.is_open(service) {
            warn!(service = %service, attempt, "Circuit breaker is open, aborting retry");
            return (Err(ResilienceError::CircuitOpen { service: service.to_string() }), report);
        }

        report.attempts += 1;
        debug!(
            service = %service,
            attempt = attempt + 1,
            max_attempts = policy.max_attempts(),
            "Executing operation"
        );

        let error = match suspend(operation(), token, deadline).await {
            Ok(Ok(value)) => {
                breakers.record_success(service);
                if attempt > 0 {
                    info!(
                        service = %service,
                        attempts = report.attempts,
                        total_delay_ms = report.total_delay.as_millis(),
                        "Operation succeeded after retries"
                    );
                }
                return (Ok(value), report);
            }
            Ok(Err(error)) => error,
            Err(interrupted) => {
                let failures = breakers.record_failure(service);
                warn!(service = %service, ?interrupted, failures, "Operation interrupted");
                return (Err(interrupted.into_error(service)), report);
            }
        };

        let failures = breakers.record_failure(service);
        let class = classify(&error);

        match class {
            FailureClass::ClientError => {
                debug!(
                    service = %service,
                    failure_class = class.as_str(),
                    error = %error,
                    "Client error, not retrying"
                );
                return (Err(error.into()), report);
            }
            FailureClass::Unknown => {
                warn!(
                    service = %service,
                    attempt = attempt + 1,
                    error = %error,
                    "Unclassified failure, retrying as transient"
                );
            }
            FailureClass::RateLimited | FailureClass::Transient => {}
        }

        if attempt >= policy.max_retries {
            warn!(
                service = %service,
                attempts = report.attempts,
                failures,
                failure_class = class.as_str(),
                error = %error,
                "All retry attempts exhausted"
            );
            return (Err(error.into()), report);
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            service = %service,
            attempt = attempt + 1,
            failure_class = class.as_str(),
            delay_ms = delay.as_millis(),
            error = %error,
            "Operation failed, retrying after backoff"
        );

        if let Err(interrupted) = suspend(tokio::time::sleep(delay), token, deadline).await {
            let failures = breakers.record_failure(service);
            warn!(service = %service, ?interrupted, failures, "Backoff interrupted");
            return (Err(interrupted.into_error(service)), report);
        }

        report.total_delay += delay;
        attempt += 1;
    }
}
