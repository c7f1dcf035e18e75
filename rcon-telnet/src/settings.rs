//! Client connection settings.

use std::time::Duration;

use rcon_telnet_common::{
    duration,
    protocol::{DEFAULT_DIAL_TIMEOUT, DEFAULT_EXIT_COMMAND, EXECUTE_TICK_TIMEOUT},
};
use serde::Deserialize;

/// Settings for a [`Connection`](crate::Connection).
///
/// A connection keeps its own copy, so changing a `Settings` value after
/// dialling has no effect on connections that already exist.
///
/// ```
/// use std::time::Duration;
/// use rcon_telnet::Settings;
///
/// let settings = Settings::default()
///     .with_dial_timeout(Duration::from_secs(2))
///     .with_clear_response(true);
///
/// assert_eq!(settings.exit_command, "exit");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Deadline for establishing the TCP connection.
    ///
    /// Default: 5 seconds
    #[serde(rename = "dial_timeout_ms", deserialize_with = "duration::millis")]
    pub dial_timeout: Duration,

    /// Command sent to end the session.
    ///
    /// Default: `exit`
    pub exit_command: String,

    /// Strip the server's `INF Executing command ...` echo from replies.
    ///
    /// Default: `false`
    pub clear_response: bool,

    /// How long a command waits for its reply before the received bytes are
    /// taken as the response. This is a fixed sleep, not an idle timeout.
    ///
    /// Default: 1 second
    #[serde(rename = "execute_tick_ms", deserialize_with = "duration::millis")]
    pub execute_tick: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            exit_command: DEFAULT_EXIT_COMMAND.to_string(),
            clear_response: false,
            execute_tick: EXECUTE_TICK_TIMEOUT,
        }
    }
}

impl Settings {
    #[must_use]
    pub const fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_exit_command(mut self, command: impl Into<String>) -> Self {
        self.exit_command = command.into();
        self
    }

    #[must_use]
    pub const fn with_clear_response(mut self, clear: bool) -> Self {
        self.clear_response = clear;
        self
    }

    #[must_use]
    pub const fn with_execute_tick(mut self, tick: Duration) -> Self {
        self.execute_tick = tick;
        self
    }
}
