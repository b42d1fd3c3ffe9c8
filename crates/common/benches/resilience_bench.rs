//! Resilience benchmarks
//!
//! Breaker record paths, backoff calculation and the uncontended limiter
//! path, plus a full retry call that succeeds first time.
//!
//! Run with: `cargo bench --bench resilience_bench -p outbound-common
//! --features runtime`

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use outbound_common::resilience::{
    CircuitBreakerRegistry, ConcurrencyLimiter, DependencyError, ResilienceRegistry, RetryPolicy,
};
use tokio::runtime::Builder as RuntimeBuilder;

// ============================================================================
// Circuit Breaker Benchmarks
// ============================================================================

fn bench_circuit_breaker_record_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker_record_paths");

    group.bench_function("record_success_existing_key", |b| {
        let breakers = CircuitBreakerRegistry::new();
        breakers.record_success("bench-api");
        b.iter(|| breakers.record_success(black_box("bench-api")));
    });

    group.bench_function("record_failure_then_success", |b| {
        let breakers = CircuitBreakerRegistry::new();
        b.iter(|| {
            black_box(breakers.record_failure("bench-api"));
            breakers.record_success("bench-api");
        });
    });

    group.bench_function("is_open_check", |b| {
        let breakers = CircuitBreakerRegistry::new();
        for _ in 0..5 {
            breakers.record_failure("tripped-api");
        }
        b.iter(|| black_box(breakers.is_open(black_box("tripped-api"))));
    });

    for keys in [1_usize, 64, 1024] {
        group.bench_with_input(BenchmarkId::new("status_snapshot", keys), &keys, |b, &keys| {
            let breakers = CircuitBreakerRegistry::new();
            for i in 0..keys {
                breakers.record_failure(&format!("service-{i}"));
            }
            b.iter(|| black_box(breakers.status()));
        });
    }

    group.finish();
}

// ============================================================================
// Backoff Benchmarks
// ============================================================================

fn bench_backoff_calculation(c: &mut Criterion) {
    let mut group = c.benchmark_group("backoff_calculation");

    let jittered = RetryPolicy::new();
    let exact = match RetryPolicy::builder().no_jitter().build() {
        Ok(policy) => policy,
        Err(err) => panic!("benchmark policy rejected: {err}"),
    };

    for attempt in [0_u32, 3, 10, 40] {
        group.bench_with_input(BenchmarkId::new("no_jitter", attempt), &attempt, |b, &attempt| {
            b.iter(|| black_box(exact.delay_for_attempt(black_box(attempt))));
        });
        group.bench_with_input(BenchmarkId::new("jitter", attempt), &attempt, |b, &attempt| {
            b.iter(|| black_box(jittered.delay_for_attempt(black_box(attempt))));
        });
    }

    group.finish();
}

// ============================================================================
// Limiter and Executor Benchmarks
// ============================================================================

fn bench_uncontended_paths(c: &mut Criterion) {
    let runtime = match RuntimeBuilder::new_current_thread().enable_time().build() {
        Ok(runtime) => runtime,
        Err(err) => panic!("failed to build tokio runtime: {err}"),
    };
    let mut group = c.benchmark_group("uncontended_paths");

    group.bench_function("limiter_acquire_release", |b| {
        let limiter = ConcurrencyLimiter::new();
        b.to_async(&runtime).iter(|| async {
            let permit = limiter.acquire("bench-api", 4).await;
            black_box(permit.is_ok());
        });
    });

    group.bench_function("execute_with_retry_first_try", |b| {
        let registry = ResilienceRegistry::new();
        let policy = RetryPolicy::builder()
            .max_retries(3)
            .min_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(10))
            .build();
        let Ok(policy) = policy else {
            panic!("benchmark policy rejected");
        };
        b.to_async(&runtime).iter(|| async {
            let result = registry
                .execute_with_retry("bench-api", &policy, || async {
                    Ok::<_, DependencyError>(black_box(1_u32))
                })
                .await;
            black_box(result.is_ok());
        });
    });

    group.bench_function("run_limited_with_retry_first_try", |b| {
        let registry = ResilienceRegistry::new();
        let policy = RetryPolicy::new();
        b.to_async(&runtime).iter(|| async {
            let result = registry
                .run_limited_with_retry("bench-api", 8, &policy, || async {
                    Ok::<_, DependencyError>(())
                })
                .await;
            black_box(result.is_ok());
        });
    });

    group.finish();
}

criterion_group!(
    resilience,
    bench_circuit_breaker_record_paths,
    bench_backoff_calculation,
    bench_uncontended_paths
);
criterion_main!(resilience);
