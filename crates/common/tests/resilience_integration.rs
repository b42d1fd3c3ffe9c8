//! Integration tests for the resilience core
//!
//! Exercises the registry's public entry points end to end: breaker trips
//! and resets, retry accounting, the concurrency bound and cancellation at
//! each suspension point.

#![cfg(feature = "runtime")]

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use outbound_common::resilience::{
    CircuitState, DependencyError, ResilienceError, ResilienceRegistry, RetryPolicy,
    FAILURE_THRESHOLD,
};
use outbound_common::testing::{wait_for_pending, ConcurrencyProbe, ScriptedOperation};
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(max_retries)
        .min_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(4))
        .no_jitter()
        .build()
        .expect("valid policy")
}

fn unavailable() -> DependencyError {
    DependencyError::from_response_status(503, "Service Unavailable")
}

//==============================================================================
// Circuit breaker
//==============================================================================

/// Validates that five consecutive failures open the breaker.
///
/// Assertions:
/// - Confirms `is_open` flips exactly at the threshold.
/// - Confirms the next call fails with `CircuitOpen` without invoking the
///   operation.
#[tokio::test]
async fn test_breaker_opens_at_threshold_and_short_circuits() {
    let registry = ResilienceRegistry::new();

    for i in 1..=FAILURE_THRESHOLD {
        assert!(!registry.breakers().is_open("search-api"), "open too early at {i}");
        registry.breakers().record_failure("search-api");
    }
    assert!(registry.breakers().is_open("search-api"));

    let op = ScriptedOperation::succeeding(());
    let err = registry
        .execute_with_retry("search-api", &fast_policy(3), op.callable())
        .await
        .unwrap_err();

    assert_eq!(err, ResilienceError::CircuitOpen { service: "search-api".into() });
    assert_eq!(op.invocations(), 0);
}

#[tokio::test]
async fn test_success_resets_failure_count() {
    let registry = ResilienceRegistry::new();
    for _ in 0..FAILURE_THRESHOLD {
        registry.breakers().record_failure("crm");
    }

    registry.breakers().record_success("crm");

    assert_eq!(registry.breakers().failure_count("crm"), 0);
    assert!(!registry.breakers().is_open("crm"));
    assert_eq!(registry.breakers().state("crm"), CircuitState::Closed);
}

/// Validates that resets are scoped.
///
/// Assertions:
/// - Confirms `reset_circuit_breaker` closes only the named key.
/// - Confirms `reset_all_circuit_breakers` closes every key.
#[tokio::test]
async fn test_reset_scopes() {
    let registry = ResilienceRegistry::new();
    for service in ["alpha", "beta", "gamma"] {
        for _ in 0..FAILURE_THRESHOLD {
            registry.breakers().record_failure(service);
        }
    }

    registry.reset_circuit_breaker("alpha");
    let status = registry.circuit_breaker_status();
    assert_eq!(status["alpha"].state, CircuitState::Closed);
    assert_eq!(status["beta"].state, CircuitState::Open);
    assert_eq!(status["gamma"].state, CircuitState::Open);

    registry.reset_all_circuit_breakers();
    assert!(registry
        .circuit_breaker_status()
        .values()
        .all(|s| s.state == CircuitState::Closed && s.failures == 0));
}

/// Validates the payments outage and manual recovery walk-through.
///
/// Assertions:
/// - Confirms five failed calls trip the breaker.
/// - Confirms call six is rejected with `CircuitOpen` and never reaches the
///   dependency.
/// - Confirms call seven succeeds after a manual reset and the status shows
///   `CLOSED` with zero failures.
#[tokio::test]
async fn test_payments_api_outage_and_manual_reset() {
    let registry = ResilienceRegistry::new();
    let single_attempt = fast_policy(0);
    let op = ScriptedOperation::failing_times(5, unavailable(), "charged");

    for _ in 0..5 {
        let err = registry
            .execute_with_retry("payments-api", &single_attempt, op.callable())
            .await
            .unwrap_err();
        assert_eq!(err.dependency().and_then(DependencyError::status), Some(503));
    }
    assert_eq!(registry.circuit_breaker_status()["payments-api"].state, CircuitState::Open);

    let sixth = registry.execute_with_retry("payments-api", &single_attempt, op.callable()).await;
    assert!(sixth.unwrap_err().is_circuit_open());
    assert_eq!(op.invocations(), 5);

    registry.reset_circuit_breaker("payments-api");

    let seventh = registry.execute_with_retry("payments-api", &single_attempt, op.callable()).await;
    assert_eq!(assert_ok!(seventh), "charged");

    let status = &registry.circuit_breaker_status()["payments-api"];
    assert_eq!(status.state, CircuitState::Closed);
    assert_eq!(status.failures, 0);
    assert_eq!(status.times_opened, 1);
}

//==============================================================================
// Retry
//==============================================================================

#[tokio::test]
async fn test_transient_failures_exhaust_all_attempts() {
    let registry = ResilienceRegistry::new();
    let op = ScriptedOperation::failing_times(10, DependencyError::timeout(), ());

    let (result, report) =
        registry.execute_with_retry_report("enrich", &fast_policy(2), op.callable()).await;

    assert_eq!(result, Err(ResilienceError::Dependency(DependencyError::timeout())));
    assert_eq!(op.invocations(), 3);
    assert_eq!(report.attempts, 3);
    assert_eq!(registry.breakers().failure_count("enrich"), 3);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let registry = ResilienceRegistry::new();
    let op = ScriptedOperation::failing_times(
        3,
        DependencyError::from_response_status(404, "Not Found"),
        (),
    );

    let result = registry.execute_with_retry("lookup", &fast_policy(3), op.callable()).await;

    assert_err!(result);
    assert_eq!(op.invocations(), 1);
    assert_eq!(registry.breakers().failure_count("lookup"), 1);
}

#[tokio::test]
async fn test_recovers_after_two_transient_failures() {
    let registry = ResilienceRegistry::new();
    let op = ScriptedOperation::failing_with(
        [unavailable(), DependencyError::from_response_status(429, "Too Many Requests")],
        42,
    );

    let value = registry.execute_with_retry("serp", &fast_policy(3), op.callable()).await;

    assert_eq!(value, Ok(42));
    assert_eq!(op.invocations(), 3);
    assert_eq!(registry.breakers().failure_count("serp"), 0);
}

/// Validates that a breaker opened by a concurrent caller stops an ongoing
/// retry loop before its next attempt.
#[tokio::test]
async fn test_retry_loop_stops_when_breaker_opens_midway() {
    let registry = ResilienceRegistry::new();
    for _ in 0..FAILURE_THRESHOLD - 1 {
        registry.breakers().record_failure("flaky");
    }
    let op = ScriptedOperation::failing_times(10, unavailable(), ());

    let err = registry.execute_with_retry("flaky", &fast_policy(5), op.callable()).await.unwrap_err();

    assert!(err.is_circuit_open());
    assert_eq!(op.invocations(), 1);
}

//==============================================================================
// Concurrency limit
//==============================================================================

/// Validates the concurrency bound under load.
///
/// Assertions:
/// - Confirms no more than two operations ever run at once.
/// - Confirms all ten calls resolve successfully.
/// - Confirms the queue is empty afterwards.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_with_limit_never_exceeds_concurrency() {
    let registry = ResilienceRegistry::new();
    let probe = ConcurrencyProbe::new();

    let calls = (0..10).map(|i| {
        let probe = probe.clone();
        let registry = &registry;
        async move {
            registry
                .run_with_limit("claude-api", 2, || async move {
                    let _guard = probe.enter();
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok::<_, DependencyError>(i)
                })
                .await
        }
    });
    let results = join_all(calls).await;

    assert_eq!(results.len(), 10);
    assert!(results.iter().all(Result::is_ok));
    assert!(probe.high_water_mark() <= 2, "high water mark {}", probe.high_water_mark());
    assert_eq!(probe.completed(), 10);

    let stats = registry.queue_stats()["claude-api"];
    assert_eq!(stats.running, 0);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.concurrency, 2);
}

#[tokio::test]
async fn test_queue_stats_while_saturated() {
    let registry = Arc::new(ResilienceRegistry::new());
    let held = registry.limiter().acquire("scraper", 1).await.unwrap();

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry.run_with_limit("scraper", 1, || async { Ok::<_, DependencyError>(()) }).await
            })
        })
        .collect();
    assert!(wait_for_pending(registry.limiter(), "scraper", 3, Duration::from_secs(1)).await);

    let stats = registry.queue_stats()["scraper"];
    assert!(stats.size >= stats.pending);
    assert_eq!(stats.running, 1);
    assert_eq!(stats.pending, 3);
    assert_eq!(stats.size, 4);

    drop(held);
    for waiter in waiters {
        assert_ok!(waiter.await.unwrap());
    }
}

/// Validates nesting the retry executor inside the concurrency limit by hand.
///
/// Assertions:
/// - Confirms concurrent nested calls stay within the limit and retry
///   inside their slot.
/// - Confirms the inner `ResilienceError` passes through the limiter
///   unchanged.
/// - Confirms breaker and queue state afterwards.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_retry_nested_inside_limit() {
    let registry = ResilienceRegistry::new();
    let policy = fast_policy(3);
    let probe = ConcurrencyProbe::new();
    let pages = ScriptedOperation::failing_times(2, unavailable(), "page");

    let calls = (0..4).map(|_| {
        let (registry, policy, probe, pages) = (&registry, &policy, probe.clone(), &pages);
        async move {
            registry
                .run_with_limit("scraper", 2, || {
                    registry.execute_with_retry("scraper", policy, move || {
                        let guard = probe.enter();
                        let attempt = pages.invoke_async();
                        async move {
                            let result = attempt.await;
                            drop(guard);
                            result
                        }
                    })
                })
                .await
        }
    });
    let results = join_all(calls).await;

    assert!(results.iter().all(|r| r.as_ref() == Ok(&"page")), "{results:?}");
    assert_eq!(pages.invocations(), 6);
    assert!(probe.high_water_mark() <= 2, "high water mark {}", probe.high_water_mark());
    assert_eq!(registry.breakers().failure_count("scraper"), 0);
    assert_eq!(registry.circuit_breaker_status()["scraper"].total_failures, 2);

    let lookup = ScriptedOperation::failing_times(
        1,
        DependencyError::from_response_status(404, "Not Found"),
        (),
    );
    let err = registry
        .run_with_limit("scraper", 2, || {
            registry.execute_with_retry("scraper", &policy, lookup.callable())
        })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ResilienceError::Dependency(DependencyError::from_response_status(404, "Not Found"))
    );
    assert_eq!(lookup.invocations(), 1);
    assert_eq!(registry.breakers().failure_count("scraper"), 1);

    let stats = registry.queue_stats()["scraper"];
    assert_eq!((stats.running, stats.pending, stats.concurrency), (0, 0, 2));
}

#[tokio::test]
async fn test_limit_and_retry_share_one_slot() {
    let registry = ResilienceRegistry::new();
    let op = ScriptedOperation::failing_times(2, unavailable(), "ok");

    let value = registry.run_limited_with_retry("combo", 1, &fast_policy(3), op.callable()).await;

    assert_eq!(value, Ok("ok"));
    assert_eq!(op.invocations(), 3);
    assert_eq!(registry.queue_stats()["combo"].running, 0);
}

//==============================================================================
// Cancellation and deadlines
//==============================================================================

/// Validates cancellation while the operation itself is in flight.
///
/// Assertions:
/// - Confirms the call returns `Cancelled`.
/// - Confirms exactly one failure is recorded.
#[tokio::test(start_paused = true)]
async fn test_cancel_during_operation() {
    let registry = ResilienceRegistry::new();
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let result = registry
        .execute_with_retry_until("slow-api", &fast_policy(3), &token, || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, DependencyError>(())
        })
        .await;

    assert_eq!(result, Err(ResilienceError::Cancelled { service: "slow-api".into() }));
    assert_eq!(registry.breakers().failure_count("slow-api"), 1);
}

/// Validates cancellation during the backoff sleep.
///
/// Assertions:
/// - Confirms no further attempt runs after the cancel.
/// - Confirms the failed attempt and the interruption are each recorded once.
#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff() {
    let registry = ResilienceRegistry::new();
    let policy = RetryPolicy::builder()
        .max_retries(3)
        .min_delay(Duration::from_secs(30))
        .max_delay(Duration::from_secs(60))
        .no_jitter()
        .build()
        .unwrap();
    let op = ScriptedOperation::failing_times(3, unavailable(), ());
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let result = registry.execute_with_retry_until("backoff", &policy, &token, op.callable()).await;

    assert_eq!(result, Err(ResilienceError::Cancelled { service: "backoff".into() }));
    assert_eq!(op.invocations(), 1);
    assert_eq!(registry.breakers().failure_count("backoff"), 2);
}

/// Validates cancellation while queued for a slot.
///
/// Assertions:
/// - Confirms the operation never runs.
/// - Confirms one failure is recorded and the waiter leaves the queue.
#[tokio::test]
async fn test_cancel_during_slot_wait() {
    let registry = Arc::new(ResilienceRegistry::new());
    let held = registry.limiter().acquire("busy", 1).await.unwrap();
    let op = ScriptedOperation::succeeding(());
    let token = CancellationToken::new();

    let waiter = {
        let registry = Arc::clone(&registry);
        let token = token.clone();
        let op = op.clone();
        tokio::spawn(async move {
            registry
                .run_limited_with_retry_until(
                    "busy",
                    1,
                    &fast_policy(1),
                    &token,
                    op.owned_callable(),
                )
                .await
        })
    };
    assert!(wait_for_pending(registry.limiter(), "busy", 1, Duration::from_secs(1)).await);

    token.cancel();
    let result = waiter.await.unwrap();

    assert_eq!(result, Err(ResilienceError::Cancelled { service: "busy".into() }));
    assert_eq!(op.invocations(), 0);
    assert_eq!(registry.breakers().failure_count("busy"), 1);
    assert_eq!(registry.queue_stats()["busy"].pending, 0);

    drop(held);
    assert_eq!(registry.queue_stats()["busy"].running, 0);
}

#[tokio::test(start_paused = true)]
async fn test_call_timeout_returns_timed_out() {
    let registry = ResilienceRegistry::new();
    let policy = RetryPolicy::builder()
        .max_retries(2)
        .call_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let result = registry
        .execute_with_retry("hung", &policy, || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, DependencyError>(())
        })
        .await;

    assert_eq!(
        result,
        Err(ResilienceError::TimedOut { service: "hung".into(), after: Duration::from_millis(50) })
    );
    assert_eq!(registry.breakers().failure_count("hung"), 1);
}

/// Validates that a call timeout too large for the clock behaves like no
/// timeout instead of failing the call.
///
/// Assertions:
/// - Confirms the policy is accepted.
/// - Confirms the retry path and the combined path both return the value.
#[tokio::test]
async fn test_huge_call_timeout_means_no_deadline() {
    let registry = ResilienceRegistry::new();
    let policy = assert_ok!(RetryPolicy::builder().call_timeout(Duration::MAX).build());

    let value = registry
        .execute_with_retry("svc", &policy, || async { Ok::<_, DependencyError>(1) })
        .await;
    assert_eq!(value, Ok(1));

    let value = registry
        .run_limited_with_retry("svc", 1, &policy, || async { Ok::<_, DependencyError>(2) })
        .await;
    assert_eq!(value, Ok(2));
    assert_eq!(registry.breakers().failure_count("svc"), 0);
}

//==============================================================================
// Introspection
//==============================================================================

#[tokio::test]
async fn test_snapshot_serializes_for_status_endpoints() {
    let registry = ResilienceRegistry::new();
    registry.breakers().record_failure("payments-api");
    registry
        .run_with_limit("payments-api", 3, || async { Ok::<_, DependencyError>(()) })
        .await
        .unwrap();

    let json = serde_json::to_value(registry.snapshot()).unwrap();

    assert_eq!(json["circuit_breakers"]["payments-api"]["state"], "CLOSED");
    assert_eq!(json["circuit_breakers"]["payments-api"]["failures"], 1);
    assert_eq!(json["queues"]["payments-api"]["concurrency"], 3);
    assert_eq!(json["queues"]["payments-api"]["size"], 0);
}
