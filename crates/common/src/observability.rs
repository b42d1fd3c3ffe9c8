//! Tracing subscriber initialisation
//!
//! Library code only emits `tracing` events. Binaries and tests that want to
//! see them install a subscriber once at startup with [`init_tracing`].
//! The filter defaults to `info` and honours `RUST_LOG`.

use std::fmt;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Default filter directive when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info";

/// Output format for log events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-field lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber
///
/// # Errors
/// Returns an error if a global subscriber is already installed.
pub fn try_init_tracing(format: LogFormat) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter());
    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
    }
}

/// Install the global subscriber, ignoring an already installed one
pub fn init_tracing(format: LogFormat) {
    if try_init_tracing(format).is_err() {
        tracing::debug!(%format, "Global tracing subscriber already installed");
    }
}
