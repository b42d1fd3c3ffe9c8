//! Process-wide resilience state and the public entry points
//!
//! A [`ResilienceRegistry`] owns the circuit breakers and the concurrency
//! queues for every service key. Create one at startup and share it by
//! reference or `Arc`; all methods take `&self`.

use std::collections::BTreeMap;
use std::future::Future;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::bulkhead::{ConcurrencyLimiter, QueueStats, SlotPermit};
use super::cancel::{suspend, Deadline, Interrupted};
use super::circuit_breaker::{BreakerStatus, CircuitBreakerRegistry};
use super::classifier::DependencyError;
use super::error::{ResilienceError, ResilienceResult};
use super::retry::{run_with_retry, RetryPolicy, RetryReport};
use crate::config::ResilienceConfig;

/// Combined introspection snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResilienceSnapshot {
    /// Breaker state per service
    pub circuit_breakers: BTreeMap<String, BreakerStatus>,
    /// Queue state per service
    pub queues: BTreeMap<String, QueueStats>,
}

/// Circuit breakers, concurrency queues and their configuration
///
/// # Examples
///
/// ```rust
/// use outbound_common::resilience::{DependencyError, ResilienceRegistry, RetryPolicy};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = ResilienceRegistry::new();
/// let policy = RetryPolicy::builder().max_retries(2).build()?;
///
/// let body = registry
///     .execute_with_retry("serp-api", &policy, || async {
///         Ok::<_, DependencyError>("results")
///     })
///     .await?;
/// assert_eq!(body, "results");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ResilienceRegistry {
    breakers: CircuitBreakerRegistry,
    limiter: ConcurrencyLimiter,
    config: ResilienceConfig,
}

impl ResilienceRegistry {
    /// Create a registry with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry whose config-driven entry points use `config`
    pub fn from_config(config: ResilienceConfig) -> ResilienceResult<Self> {
        config
            .validate()
            .map_err(|err| ResilienceError::invalid_configuration(err.to_string()))?;
        Ok(Self { config, ..Self::default() })
    }

    /// Configuration used by [`execute`](Self::execute), [`run`](Self::run)
    /// and [`call`](Self::call)
    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// Direct access to the breakers
    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// Direct access to the concurrency limiter
    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    //--------------------------------------------------------------------------
    // Retry
    //--------------------------------------------------------------------------

    /// Run `operation` with retry and circuit breaking for `service`
    pub async fn execute_with_retry<F, Fut, T>(
        &self,
        service: &str,
        policy: &RetryPolicy,
        operation: F,
    ) -> ResilienceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DependencyError>>,
    {
        self.execute_with_retry_report(service, policy, operation).await.0
    }

    /// Same as [`execute_with_retry`](Self::execute_with_retry), stopping
    /// early when `token` is cancelled
    pub async fn execute_with_retry_until<F, Fut, T>(
        &self,
        service: &str,
        policy: &RetryPolicy,
        token: &CancellationToken,
        operation: F,
    ) -> ResilienceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DependencyError>>,
    {
        self.retry_inner(service, policy, token, operation).await.0
    }

    /// Same as [`execute_with_retry`](Self::execute_with_retry), also
    /// returning the attempt count and the time spent backing off
    pub async fn execute_with_retry_report<F, Fut, T>(
        &self,
        service: &str,
        policy: &RetryPolicy,
        operation: F,
    ) -> (ResilienceResult<T>, RetryReport)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DependencyError>>,
    {
        self.retry_inner(service, policy, &CancellationToken::new(), operation).await
    }

    async fn retry_inner<F, Fut, T>(
        &self,
        service: &str,
        policy: &RetryPolicy,
        token: &CancellationToken,
        operation: F,
    ) -> (ResilienceResult<T>, RetryReport)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DependencyError>>,
    {
        if let Err(err) = policy.validate() {
            return (Err(err), RetryReport::default());
        }
        let deadline = Deadline::starting_now(policy.call_timeout);
        run_with_retry(&self.breakers, service, policy, token, deadline, operation).await
    }

    //--------------------------------------------------------------------------
    // Concurrency limit
    //--------------------------------------------------------------------------

    /// Run `operation` once `service` has a free slot
    ///
    /// The operation's own error is passed through; `DependencyError`s come
    /// back as `ResilienceError::Dependency`.
    pub async fn run_with_limit<F, Fut, T, E>(
        &self,
        service: &str,
        concurrency: usize,
        operation: F,
    ) -> ResilienceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<ResilienceError>,
    {
        let _permit = self.limiter.acquire(service, concurrency).await?;
        operation().await.map_err(Into::into)
    }

    /// Same as [`run_with_limit`](Self::run_with_limit), stopping early when
    /// `token` is cancelled while waiting for a slot or while the operation
    /// runs
    pub async fn run_with_limit_until<F, Fut, T, E>(
        &self,
        service: &str,
        concurrency: usize,
        token: &CancellationToken,
        operation: F,
    ) -> ResilienceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<ResilienceError>,
    {
        let _permit = self.acquire_slot(service, concurrency, token, None).await?;
        match suspend(operation(), token, None).await {
            Ok(result) => result.map_err(Into::into),
            Err(interrupted) => Err(self.interrupted(service, interrupted)),
        }
    }

    //--------------------------------------------------------------------------
    // Combined
    //--------------------------------------------------------------------------

    /// Acquire a slot for `service`, then run the retry loop inside it
    pub async fn run_limited_with_retry<F, Fut, T>(
        &self,
        service: &str,
        concurrency: usize,
        policy: &RetryPolicy,
        operation: F,
    ) -> ResilienceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DependencyError>>,
    {
        self.run_limited_with_retry_until(
            service,
            concurrency,
            policy,
            &CancellationToken::new(),
            operation,
        )
        .await
    }

    /// Same as [`run_limited_with_retry`](Self::run_limited_with_retry),
    /// stopping early when `token` is cancelled
    ///
    /// The policy's `call_timeout` covers the slot wait as well as the retry
    /// loop.
    pub async fn run_limited_with_retry_until<F, Fut, T>(
        &self,
        service: &str,
        concurrency: usize,
        policy: &RetryPolicy,
        token: &CancellationToken,
        operation: F,
    ) -> ResilienceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DependencyError>>,
    {
        policy.validate()?;
        let deadline = Deadline::starting_now(policy.call_timeout);

        let _permit = self.acquire_slot(service, concurrency, token, deadline).await?;
        run_with_retry(&self.breakers, service, policy, token, deadline, operation).await.0
    }

    async fn acquire_slot(
        &self,
        service: &str,
        concurrency: usize,
        token: &CancellationToken,
        deadline: Option<Deadline>,
    ) -> ResilienceResult<SlotPermit> {
        match self.limiter.acquire_until(service, concurrency, token, deadline).await {
            Ok(permit) => Ok(permit),
            Err(err @ (ResilienceError::Cancelled { .. } | ResilienceError::TimedOut { .. })) => {
                let failures = self.breakers.record_failure(service);
                warn!(service = %service, failures, error = %err, "Slot wait interrupted");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    fn interrupted(&self, service: &str, interrupted: Interrupted) -> ResilienceError {
        let failures = self.breakers.record_failure(service);
        warn!(service = %service, ?interrupted, failures, "Operation interrupted");
        interrupted.into_error(service)
    }

    //--------------------------------------------------------------------------
    // Config-driven
    //--------------------------------------------------------------------------

    /// [`execute_with_retry`](Self::execute_with_retry) with the configured
    /// policy for `service`
    pub async fn execute<F, Fut, T>(&self, service: &str, operation: F) -> ResilienceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DependencyError>>,
    {
        let policy = self.config.policy_for(service);
        self.execute_with_retry(service, &policy, operation).await
    }

    /// [`run_with_limit`](Self::run_with_limit) with the configured
    /// concurrency for `service`
    pub async fn run<F, Fut, T, E>(&self, service: &str, operation: F) -> ResilienceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<ResilienceError>,
    {
        let concurrency = self.config.concurrency_for(service);
        self.run_with_limit(service, concurrency, operation).await
    }

    /// [`run_limited_with_retry`](Self::run_limited_with_retry) with the
    /// configured concurrency and policy for `service`
    pub async fn call<F, Fut, T>(&self, service: &str, operation: F) -> ResilienceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DependencyError>>,
    {
        let concurrency = self.config.concurrency_for(service);
        let policy = self.config.policy_for(service);
        self.run_limited_with_retry(service, concurrency, &policy, operation).await
    }

    //--------------------------------------------------------------------------
    // Introspection
    //--------------------------------------------------------------------------

    /// Breaker state per service
    pub fn circuit_breaker_status(&self) -> BTreeMap<String, BreakerStatus> {
        self.breakers.status()
    }

    /// Queue state per service
    pub fn queue_stats(&self) -> BTreeMap<String, QueueStats> {
        self.limiter.stats()
    }

    /// Close one service's breaker
    pub fn reset_circuit_breaker(&self, service: &str) {
        self.breakers.reset(service);
    }

    /// Close every breaker
    pub fn reset_all_circuit_breakers(&self) {
        self.breakers.reset_all();
    }

    /// Both snapshots at once
    pub fn snapshot(&self) -> ResilienceSnapshot {
        ResilienceSnapshot {
            circuit_breakers: self.circuit_breaker_status(),
            queues: self.queue_stats(),
        }
    }
}
