//! Serialization helpers for configuration values
//!
//! Durations in configuration files and introspection snapshots are written as
//! whole milliseconds so that TOML, JSON and environment overrides all agree
//! on a single unit.

use std::time::Duration;

use serde::ser::Error as SerError;
use serde::{Deserialize, Deserializer, Serializer};

/// Serde serialization result type
type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

fn millis_u64<E: SerError>(duration: &Duration) -> Result<u64, E> {
    u64::try_from(duration.as_millis())
        .map_err(|_| E::custom("duration too large to fit into a 64-bit millisecond representation"))
}

/// Serialize / deserialize a `Duration` as milliseconds (u64)
///
/// # Usage
/// ```rust
/// use std::time::Duration;
///
/// use outbound_common::duration_millis;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Example {
///     #[serde(with = "duration_millis")]
///     min_delay: Duration,
/// }
/// ```
pub mod duration_millis {
    use super::*;

    /// Serialize a Duration as milliseconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        serializer.serialize_u64(millis_u64::<S::Error>(duration)?)
    }

    /// Deserialize milliseconds (u64) into a Duration
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Same as [`duration_millis`] for `Option<Duration>`; `None` is omitted or
/// written as `null`.
pub mod option_duration_millis {
    use super::*;

    /// Serialize an optional Duration as milliseconds
    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serializer.serialize_some(&millis_u64::<S::Error>(duration)?),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize optional milliseconds into an optional Duration
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
