// Suspension points raced against caller cancellation and the call deadline
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::ResilienceError;

/// Overall deadline for one call, fixed when the call starts
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Instant,
    after: Duration,
}

impl Deadline {
    /// `None` when there is no timeout, or when it lies beyond the clock's
    /// range and so can never fire.
    pub(crate) fn starting_now(timeout: Option<Duration>) -> Option<Self> {
        timeout.and_then(|after| Instant::now().checked_add(after).map(|at| Self { at, after }))
    }
}

/// Why a suspended call stopped waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupted {
    Cancelled,
    TimedOut(Duration),
}

impl Interrupted {
    pub(crate) fn into_error(self, service: &str) -> ResilienceError {
        match self {
            Self::Cancelled => ResilienceError::Cancelled { service: service.to_string() },
            Self::TimedOut(after) => {
                ResilienceError::TimedOut { service: service.to_string(), after }
            }
        }
    }
}

/// Await `fut` unless the token fires or the deadline passes first.
///
/// The future is dropped when interrupted.
pub(crate) async fn suspend<F>(
    fut: F,
    token: &CancellationToken,
    deadline: Option<Deadline>,
) -> Result<F::Output, Interrupted>
where
    F: Future,
{
    let expiry = async move {
        match deadline {
            Some(deadline) => {
                tokio::time::sleep_until(deadline.at).await;
                deadline.after
            }
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Interrupted::Cancelled),
        after = expiry => Err(Interrupted::TimedOut(after)),
        output = fut => Ok(output),
    }
}
