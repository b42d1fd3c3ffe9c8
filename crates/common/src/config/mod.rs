//! Resilience configuration
//!
//! Default retry policy, default concurrency and per-service overrides.
//! Loaded from a TOML or JSON file and adjusted by `OUTBOUND_*` environment
//! variables; see [`loader`].
//!
//! ```toml
//! [retry]
//! max_retries = 3
//! min_delay_ms = 1000
//! max_delay_ms = 10000
//! jitter_factor = 0.3
//!
//! [limiter]
//! default_concurrency = 5
//!
//! [services."claude-api"]
//! max_retries = 2
//! concurrency = 2
//! ```

pub mod loader;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use loader::{
    apply_env_overrides, apply_overrides_with, load, load_from_file, parse_config, ConfigFormat,
};

use crate::error::CommonError;
use crate::resilience::constants::DEFAULT_CONCURRENCY;
use crate::resilience::RetryPolicy;
use crate::utils::serde::option_duration_millis;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid {format} format: {message}")]
    Parse { format: ConfigFormat, message: String },

    #[error("Unsupported config format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Invalid value '{value}' for {key}: {message}")]
    InvalidEnv { key: String, value: String, message: String },

    #[error("Invalid configuration for '{field}': {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    fn invalid<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Invalid { field: field.into(), message: message.into() }
    }
}

impl From<ConfigError> for CommonError {
    fn from(err: ConfigError) -> Self {
        match &err {
            ConfigError::Invalid { field, message } => {
                CommonError::config_field(field.clone(), message.clone())
            }
            ConfigError::InvalidEnv { key, .. } => {
                CommonError::config_field(key.clone(), err.to_string())
            }
            ConfigError::Read { .. } => {
                CommonError::persistence_op("read config", err.to_string())
            }
            ConfigError::Parse { format, message } => {
                CommonError::serialization_format(format.to_string(), message.clone())
            }
            _ => CommonError::config(err.to_string()),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Concurrency limiter defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Limit used for services without an override
    pub default_concurrency: usize,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self { default_concurrency: DEFAULT_CONCURRENCY }
    }
}

/// Per-service values that replace the defaults when set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(
        rename = "min_delay_ms",
        with = "option_duration_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub min_delay: Option<Duration>,
    #[serde(
        rename = "max_delay_ms",
        with = "option_duration_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_delay: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_factor: Option<f64>,
    #[serde(
        rename = "call_timeout_ms",
        with = "option_duration_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub call_timeout: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

/// Full resilience configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Default retry policy
    pub retry: RetryPolicy,
    /// Default concurrency limit
    pub limiter: LimiterConfig,
    /// Overrides keyed by service
    pub services: BTreeMap<String, ServiceOverrides>,
}

impl ResilienceConfig {
    /// Retry policy for `service`, overrides applied
    pub fn policy_for(&self, service: &str) -> RetryPolicy {
        let mut policy = self.retry.clone();
        if let Some(overrides) = self.services.get(service) {
            if let Some(max_retries) = overrides.max_retries {
                policy.max_retries = max_retries;
            }
            if let Some(min_delay) = overrides.min_delay {
                policy.min_delay = min_delay;
            }
            if let Some(max_delay) = overrides.max_delay {
                policy.max_delay = max_delay;
            }
            if let Some(jitter_factor) = overrides.jitter_factor {
                policy.jitter_factor = jitter_factor;
            }
            if overrides.call_timeout.is_some() {
                policy.call_timeout = overrides.call_timeout;
            }
        }
        policy
    }

    /// Concurrency limit for `service`
    pub fn concurrency_for(&self, service: &str) -> usize {
        self.services
            .get(service)
            .and_then(|overrides| overrides.concurrency)
            .unwrap_or(self.limiter.default_concurrency)
    }

    /// Validate the defaults and every resolved service entry
    pub fn validate(&self) -> ConfigResult<()> {
        self.retry.validate().map_err(|err| ConfigError::invalid("retry", err.to_string()))?;

        if self.limiter.default_concurrency == 0 {
            return Err(ConfigError::invalid(
                "limiter.default_concurrency",
                "must be greater than 0",
            ));
        }

        for service in self.services.keys() {
            self.policy_for(service)
                .validate()
                .map_err(|err| ConfigError::invalid(format!("services.{service}"), err.to_string()))?;

            if self.concurrency_for(service) == 0 {
                return Err(ConfigError::invalid(
                    format!("services.{service}.concurrency"),
                    "must be greater than 0",
                ));
            }
        }

        Ok(())
    }
}
