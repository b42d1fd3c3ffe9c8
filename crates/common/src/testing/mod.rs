//! Testing utilities and helpers
//!
//! Helpers for exercising the resilience core from unit and integration
//! tests:
//! - **[`scripted`]**: operations that fail with a scripted sequence of
//!   dependency errors, then succeed
//! - **[`probe`]**: a concurrency probe recording the high-water mark of
//!   simultaneously running operations
//! - **[`async_utils`]**: polling helpers for async assertions
//!
//! ## Usage
//!
//! ```rust
//! use outbound_common::resilience::{DependencyError, ResilienceRegistry, RetryPolicy};
//! use outbound_common::testing::ScriptedOperation;
//!
//! # async fn example() {
//! let registry = ResilienceRegistry::new();
//! let policy = RetryPolicy::builder().no_jitter().build().unwrap();
//! let op = ScriptedOperation::failing_with([DependencyError::timeout()], "done");
//!
//! let value = registry.execute_with_retry("svc", &policy, op.callable()).await;
//! assert_eq!(value.unwrap(), "done");
//! assert_eq!(op.invocations(), 2);
//! # }
//! ```

pub mod async_utils;
pub mod probe;
pub mod scripted;

pub use async_utils::{poll_until, wait_for_pending};
pub use probe::{ConcurrencyProbe, ProbeGuard};
pub use scripted::ScriptedOperation;
