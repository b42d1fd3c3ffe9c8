//! Scripted operations for retry tests

#![allow(clippy::missing_panics_doc)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::resilience::DependencyError;

/// An operation that fails with queued errors, then succeeds
///
/// Clones share the script and the invocation counter.
#[derive(Debug, Clone)]
pub struct ScriptedOperation<T> {
    errors: Arc<Mutex<VecDeque<DependencyError>>>,
    success: T,
    invocations: Arc<AtomicU32>,
}

impl<T: Clone> ScriptedOperation<T> {
    /// Succeed immediately with `success`
    pub fn succeeding(success: T) -> Self {
        Self::failing_with([], success)
    }

    /// Fail once per error in `errors`, in order, then succeed with `success`
    pub fn failing_with<I>(errors: I, success: T) -> Self
    where
        I: IntoIterator<Item = DependencyError>,
    {
        Self {
            errors: Arc::new(Mutex::new(errors.into_iter().collect())),
            success,
            invocations: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Fail `times` times with the same error, then succeed
    pub fn failing_times(times: usize, error: DependencyError, success: T) -> Self {
        Self::failing_with(std::iter::repeat(error).take(times), success)
    }

    /// Run one attempt
    pub fn invoke(&self) -> Result<T, DependencyError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        match self.errors.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(self.success.clone()),
        }
    }

    /// A closure suitable for the retry entry points
    pub fn callable(&self) -> impl FnMut() -> std::future::Ready<Result<T, DependencyError>> + '_ {
        move || std::future::ready(self.invoke())
    }

    /// Same as [`callable`](Self::callable), owning a clone of the script
    pub fn owned_callable(
        &self,
    ) -> impl FnMut() -> std::future::Ready<Result<T, DependencyError>> + Send + 'static
    where
        T: Send + 'static,
    {
        let op = self.clone();
        move || std::future::ready(op.invoke())
    }

    /// Run one attempt after yielding to the runtime
    pub fn invoke_async(&self) -> impl Future<Output = Result<T, DependencyError>> + '_ {
        async move {
            tokio::task::yield_now().await;
            self.invoke()
        }
    }

    /// Times the operation has been invoked
    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Errors still queued
    pub fn remaining_failures(&self) -> usize {
        self.errors.lock().len()
    }
}
