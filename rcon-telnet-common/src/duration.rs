//! Serde helpers for durations written as whole milliseconds.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Deserialize a `u64` number of milliseconds into a [`Duration`].
///
/// Use with `#[serde(deserialize_with = "rcon_telnet_common::duration::millis")]`.
pub fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
