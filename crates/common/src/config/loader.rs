//! Configuration loader
//!
//! ## Loading Strategy
//! 1. Read the file, if a path is given (TOML or JSON, by extension)
//! 2. Otherwise start from defaults
//! 3. Apply `OUTBOUND_*` environment overrides
//! 4. Validate
//!
//! ## Environment Variables
//! - `OUTBOUND_MAX_RETRIES`: default retries after the first attempt
//! - `OUTBOUND_MIN_DELAY_MS`: default base backoff delay
//! - `OUTBOUND_MAX_DELAY_MS`: default backoff cap
//! - `OUTBOUND_JITTER_FACTOR`: default jitter factor in `[0, 1]`
//! - `OUTBOUND_CALL_TIMEOUT_MS`: default overall call deadline
//! - `OUTBOUND_DEFAULT_CONCURRENCY`: default per-service concurrency

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, info};

use super::{ConfigError, ConfigResult, ResilienceConfig};

pub const ENV_MAX_RETRIES: &str = "OUTBOUND_MAX_RETRIES";
pub const ENV_MIN_DELAY_MS: &str = "OUTBOUND_MIN_DELAY_MS";
pub const ENV_MAX_DELAY_MS: &str = "OUTBOUND_MAX_DELAY_MS";
pub const ENV_JITTER_FACTOR: &str = "OUTBOUND_JITTER_FACTOR";
pub const ENV_CALL_TIMEOUT_MS: &str = "OUTBOUND_CALL_TIMEOUT_MS";
pub const ENV_DEFAULT_CONCURRENCY: &str = "OUTBOUND_DEFAULT_CONCURRENCY";

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        match extension {
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::UnsupportedFormat { extension: other.to_string() }),
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toml => write!(f, "TOML"),
            Self::Json => write!(f, "JSON"),
        }
    }
}

/// Load configuration: file (or defaults), then environment, then validation
///
/// # Errors
/// Returns `ConfigError` if the file cannot be read or parsed, an
/// environment variable holds an unparsable value, or the result fails
/// validation.
pub fn load(path: Option<&Path>) -> ConfigResult<ResilienceConfig> {
    let mut config = match path {
        Some(path) => load_from_file(path)?,
        None => {
            debug!("No config file given, starting from defaults");
            ResilienceConfig::default()
        }
    };

    apply_env_overrides(&mut config)?;
    config.validate()?;

    info!(
        max_retries = config.retry.max_retries,
        default_concurrency = config.limiter.default_concurrency,
        services = config.services.len(),
        "Resilience configuration loaded"
    );
    Ok(config)
}

/// Load configuration from a file without environment overrides
///
/// # Errors
/// Returns `ConfigError` if the file does not exist, cannot be read, has an
/// unsupported extension or fails to parse.
pub fn load_from_file(path: &Path) -> ConfigResult<ResilienceConfig> {
    if !path.exists() {
        return Err(ConfigError::NotFound { path: path.to_path_buf() });
    }
    let format = ConfigFormat::from_path(path)?;

    info!(path = %path.display(), %format, "Loading configuration from file");

    let contents = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

    parse_config(&contents, format)
}

/// Parse configuration from string content
///
/// # Errors
/// Returns `ConfigError::Parse` if the content is not valid for `format`.
pub fn parse_config(contents: &str, format: ConfigFormat) -> ConfigResult<ResilienceConfig> {
    match format {
        ConfigFormat::Toml => toml::from_str(contents)
            .map_err(|e| ConfigError::Parse { format, message: e.to_string() }),
        ConfigFormat::Json => serde_json::from_str(contents)
            .map_err(|e| ConfigError::Parse { format, message: e.to_string() }),
    }
}

/// Apply `OUTBOUND_*` variables from the process environment
///
/// # Errors
/// Returns `ConfigError::InvalidEnv` for a set but unparsable variable.
pub fn apply_env_overrides(config: &mut ResilienceConfig) -> ConfigResult<()> {
    apply_overrides_with(config, |key| std::env::var(key).ok())
}

/// Apply `OUTBOUND_*` variables read through `lookup`
///
/// # Errors
/// Returns `ConfigError::InvalidEnv` for a set but unparsable variable.
pub fn apply_overrides_with<L>(config: &mut ResilienceConfig, lookup: L) -> ConfigResult<()>
where
    L: Fn(&str) -> Option<String>,
{
    if let Some(max_retries) = parse_var::<u32, _>(&lookup, ENV_MAX_RETRIES)? {
        config.retry.max_retries = max_retries;
    }
    if let Some(millis) = parse_var::<u64, _>(&lookup, ENV_MIN_DELAY_MS)? {
        config.retry.min_delay = Duration::from_millis(millis);
    }
    if let Some(millis) = parse_var::<u64, _>(&lookup, ENV_MAX_DELAY_MS)? {
        config.retry.max_delay = Duration::from_millis(millis);
    }
    if let Some(factor) = parse_var::<f64, _>(&lookup, ENV_JITTER_FACTOR)? {
        config.retry.jitter_factor = factor;
    }
    if let Some(millis) = parse_var::<u64, _>(&lookup, ENV_CALL_TIMEOUT_MS)? {
        config.retry.call_timeout = Some(Duration::from_millis(millis));
    }
    if let Some(concurrency) = parse_var::<usize, _>(&lookup, ENV_DEFAULT_CONCURRENCY)? {
        config.limiter.default_concurrency = concurrency;
    }
    Ok(())
}

fn parse_var<T, L>(lookup: &L, key: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
    L: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let value = raw.trim();
    if value.is_empty() {
        return Ok(None);
    }

    match value.parse::<T>() {
        Ok(parsed) => {
            debug!(key, value, "Applying environment override");
            Ok(Some(parsed))
        }
        Err(e) => Err(ConfigError::InvalidEnv {
            key: key.to_string(),
            value: value.to_string(),
            message: e.to_string(),
        }),
    }
}
