//! Failure classification for dependency errors
//!
//! Every failed attempt is mapped to a [`FailureClass`], which decides
//! whether the retry loop keeps going. Classification is a pure function of
//! the error value.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::error::{ErrorClassification, ErrorSeverity};

/// Error returned by a call into an external dependency
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    /// The dependency answered with an explicit status code
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response (DNS, connect, reset)
    #[error("network error: {message}")]
    Network { message: String },

    /// The request timed out before a response arrived
    #[error("request timed out{}", elapsed_suffix(.elapsed))]
    Timeout { elapsed: Option<Duration> },

    /// Anything else
    #[error("{message}")]
    Other { message: String },
}

fn elapsed_suffix(elapsed: &Option<Duration>) -> String {
    elapsed.map(|e| format!(" after {e:?}")).unwrap_or_default()
}

impl DependencyError {
    /// Build a status error from a non-success response
    pub fn from_response_status<M: Into<String>>(status: u16, message: M) -> Self {
        Self::Status { status, message: message.into() }
    }

    /// Build a network error
    pub fn network<M: Into<String>>(message: M) -> Self {
        Self::Network { message: message.into() }
    }

    /// Build a timeout error without a measured duration
    pub fn timeout() -> Self {
        Self::Timeout { elapsed: None }
    }

    /// Build an opaque error
    pub fn other<M: Into<String>>(message: M) -> Self {
        Self::Other { message: message.into() }
    }

    /// Status code carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify this error
    pub fn class(&self) -> FailureClass {
        classify(self)
    }
}

impl From<reqwest::Error> for DependencyError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Status { status: status.as_u16(), message: err.to_string() };
        }
        if err.is_timeout() {
            return Self::Timeout { elapsed: None };
        }
        if err.is_connect() || err.is_request() {
            return Self::Network { message: err.to_string() };
        }
        Self::Other { message: err.to_string() }
    }
}

impl ErrorClassification for DependencyError {
    fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }

    fn severity(&self) -> ErrorSeverity {
        match self.class() {
            FailureClass::ClientError => ErrorSeverity::Error,
            FailureClass::RateLimited | FailureClass::Transient | FailureClass::Unknown => {
                ErrorSeverity::Warning
            }
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Category of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// 4xx other than 429, never retried
    ClientError,
    /// 429 Too Many Requests
    RateLimited,
    /// 5xx, network failure or timeout
    Transient,
    /// No recognisable signal; retried like `Transient`
    Unknown,
}

impl FailureClass {
    /// Whether the retry loop may try again after this class of failure
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::ClientError)
    }

    /// Stable label used in log fields
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientError => "client_error",
            Self::RateLimited => "rate_limited",
            Self::Transient => "transient",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a dependency error
pub fn classify(error: &DependencyError) -> FailureClass {
    match error {
        DependencyError::Status { status: 429, .. } => FailureClass::RateLimited,
        DependencyError::Status { status: 400..=499, .. } => FailureClass::ClientError,
        DependencyError::Status { status: 500..=599, .. } => FailureClass::Transient,
        DependencyError::Status { .. } => FailureClass::Unknown,
        DependencyError::Network { .. } | DependencyError::Timeout { .. } => {
            FailureClass::Transient
        }
        DependencyError::Other { .. } => FailureClass::Unknown,
    }
}
