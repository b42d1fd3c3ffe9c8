// Error types for the resilience core
use std::time::Duration;

use thiserror::Error;

use super::classifier::DependencyError;
use crate::error::{CommonError, ErrorClassification, ErrorSeverity};

/// Errors returned by the retry executor and the concurrency limiter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResilienceError {
    /// The service's circuit breaker is open; the operation was not invoked
    #[error("Circuit breaker is open for service '{service}'")]
    CircuitOpen { service: String },

    /// The wrapped operation failed; the original error is returned unchanged
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// The caller cancelled the call while it was suspended
    #[error("Call to '{service}' was cancelled")]
    Cancelled { service: String },

    /// The overall call deadline elapsed while the call was suspended
    #[error("Call to '{service}' timed out after {after:?}")]
    TimedOut { service: String, after: Duration },

    /// A limit or policy value was rejected
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl ResilienceError {
    pub(crate) fn invalid_configuration<M: Into<String>>(message: M) -> Self {
        Self::InvalidConfiguration { message: message.into() }
    }

    /// The dependency error, when the failure came from the operation itself
    pub fn dependency(&self) -> Option<&DependencyError> {
        match self {
            Self::Dependency(err) => Some(err),
            _ => None,
        }
    }

    /// Whether the call was rejected by an open circuit
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

impl ErrorClassification for ResilienceError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Dependency(err) => err.is_retryable(),
            Self::CircuitOpen { .. } | Self::Cancelled { .. } | Self::TimedOut { .. } => true,
            Self::InvalidConfiguration { .. } => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Dependency(err) => err.severity(),
            Self::CircuitOpen { .. } | Self::TimedOut { .. } => ErrorSeverity::Warning,
            Self::Cancelled { .. } => ErrorSeverity::Info,
            Self::InvalidConfiguration { .. } => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

// Cross-module conversion into the shared taxonomy
impl From<ResilienceError> for CommonError {
    fn from(err: ResilienceError) -> Self {
        match err {
            ResilienceError::CircuitOpen { service } => CommonError::circuit_breaker(service),
            ResilienceError::Dependency(source) => {
                let retryable = source.is_retryable();
                CommonError::backend("dependency", source.to_string(), retryable)
            }
            ResilienceError::Cancelled { service } => {
                CommonError::task_cancelled_with_reason(service, "cancelled by caller")
            }
            ResilienceError::TimedOut { service, after } => CommonError::timeout(service, after),
            ResilienceError::InvalidConfiguration { message } => CommonError::config(message),
        }
    }
}

/// Result type for resilience operations
pub type ResilienceResult<T> = Result<T, ResilienceError>;
