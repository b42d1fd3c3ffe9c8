//! Shared error types and classification
//!
//! This module provides the error vocabulary shared by every Outbound module:
//!
//! 1. **`CommonError`**: variants for failures that are not specific to one
//!    component (configuration, serialization, timeouts, cancellation, open
//!    circuits).
//!
//! 2. **`ErrorClassification` trait**: a standard interface for asking an
//!    error whether it is retryable, how severe it is and whether it carries
//!    a retry hint.
//!
//! 3. **`ErrorSeverity` enum**: a single severity scale used for log levels
//!    and alerting.
//!
//! Component errors (for example `resilience::ResilienceError`) implement
//! `ErrorClassification` themselves and convert into `CommonError` when a
//! caller wants the shared taxonomy.

use std::fmt;
use std::time::Duration;

/// Standard result type using CommonError
pub type CommonResult<T> = Result<T, CommonError>;

/// Error variants shared across modules
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Configuration could not be loaded or failed validation
    Config { message: String, field: Option<String> },

    /// Serialization or deserialization failed
    Serialization { message: String, format: Option<String> },

    /// Reading or writing a file failed
    Persistence { message: String, operation: Option<String> },

    /// Circuit breaker is open for a service
    CircuitBreakerOpen { service: String },

    /// An operation exceeded its deadline
    Timeout { operation: String, duration: Duration },

    /// An operation was cancelled by its caller
    TaskCancelled { task_id: String, reason: Option<String> },

    /// An external dependency failed
    Backend { service: String, message: String, is_retryable: bool },
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { message, field } => {
                if let Some(field) = field {
                    write!(f, "Configuration error in field '{field}': {message}")
                } else {
                    write!(f, "Configuration error: {message}")
                }
            }
            Self::Serialization { message, format } => {
                if let Some(format) = format {
                    write!(f, "Serialization error ({format}): {message}")
                } else {
                    write!(f, "Serialization error: {message}")
                }
            }
            Self::Persistence { message, operation } => {
                if let Some(op) = operation {
                    write!(f, "Persistence error during '{op}': {message}")
                } else {
                    write!(f, "Persistence error: {message}")
                }
            }
            Self::CircuitBreakerOpen { service } => {
                write!(f, "Circuit breaker open for '{service}'")
            }
            Self::Timeout { operation, duration } => {
                write!(f, "Operation '{operation}' timed out after {duration:?}")
            }
            Self::TaskCancelled { task_id, reason } => {
                if let Some(reason) = reason {
                    write!(f, "Task '{task_id}' cancelled: {reason}")
                } else {
                    write!(f, "Task '{task_id}' cancelled")
                }
            }
            Self::Backend { service, message, .. } => {
                write!(f, "Backend error from '{service}': {message}")
            }
        }
    }
}

impl std::error::Error for CommonError {}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::CircuitBreakerOpen { .. } | Self::Timeout { .. } => true,
            Self::Backend { is_retryable, .. } => *is_retryable,
            Self::Config { .. }
            | Self::Serialization { .. }
            | Self::Persistence { .. }
            | Self::TaskCancelled { .. } => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Config { .. } | Self::Serialization { .. } | Self::Persistence { .. } => {
                ErrorSeverity::Error
            }
            Self::Backend { .. } => ErrorSeverity::Error,
            Self::CircuitBreakerOpen { .. } | Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::TaskCancelled { .. } => ErrorSeverity::Info,
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl CommonError {
    /// Create a simple configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), field: None }
    }

    /// Create a configuration error for a specific field
    pub fn config_field<S: Into<String>, F: Into<String>>(field: F, message: S) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }

    /// Create a serialization error tagged with its format
    pub fn serialization_format<S: Into<String>, F: Into<String>>(format: F, message: S) -> Self {
        Self::Serialization { message: message.into(), format: Some(format.into()) }
    }

    /// Create a persistence error for a named operation
    pub fn persistence_op<S: Into<String>, O: Into<String>>(operation: O, message: S) -> Self {
        Self::Persistence { message: message.into(), operation: Some(operation.into()) }
    }

    /// Create an open-circuit error for a service
    pub fn circuit_breaker<S: Into<String>>(service: S) -> Self {
        Self::CircuitBreakerOpen { service: service.into() }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, duration: Duration) -> Self {
        Self::Timeout { operation: operation.into(), duration }
    }

    /// Create a cancellation error with a reason
    pub fn task_cancelled_with_reason<S: Into<String>, R: Into<String>>(
        task_id: S,
        reason: R,
    ) -> Self {
        Self::TaskCancelled { task_id: task_id.into(), reason: Some(reason.into()) }
    }

    /// Create a backend error
    pub fn backend<S: Into<String>, M: Into<String>>(
        service: S,
        message: M,
        is_retryable: bool,
    ) -> Self {
        Self::Backend { service: service.into(), message: message.into(), is_retryable }
    }
}

/// Error classification trait for consistent handling across modules
///
/// # Example
///
/// ```rust,ignore
/// use outbound_common::error::{ErrorClassification, ErrorSeverity};
///
/// impl ErrorClassification for MyError {
///     fn is_retryable(&self) -> bool {
///         matches!(self, Self::Transient(_))
///     }
///
///     fn severity(&self) -> ErrorSeverity {
///         ErrorSeverity::Warning
///     }
///
///     fn is_critical(&self) -> bool {
///         false
///     }
///
///     fn retry_after(&self) -> Option<Duration> {
///         None
///     }
/// }
/// ```
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient issues that may succeed if attempted
    /// again: network failures, timeouts, rate limiting, 5xx responses.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    ///
    /// Used for logging and alerting decisions.
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}
