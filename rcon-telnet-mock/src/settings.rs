//! Mock server settings

use std::time::Duration;

use rcon_telnet_common::{duration, protocol::DEFAULT_EXIT_COMMAND};
use serde::Deserialize;

/// Password used when none is configured
pub const DEFAULT_PASSWORD: &str = "password";

/// How long `close` waits for connections to finish on their own
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Settings for a mock [`Server`](crate::Server).
///
/// Each connection takes a snapshot when it is accepted, so changes only
/// affect connections accepted afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Password clients must send. Its length is also the number of bytes
    /// read per login attempt.
    pub password: String,

    /// Artificial delay before each login attempt is handled.
    #[serde(rename = "auth_response_delay_ms", deserialize_with = "duration::millis")]
    pub auth_response_delay: Duration,

    /// Artificial delay before each command is handled.
    #[serde(rename = "command_response_delay_ms", deserialize_with = "duration::millis")]
    pub command_response_delay: Duration,

    /// A command line equal to this ends the session.
    pub exit_command: String,

    /// How long `close` lets connections finish before force-closing them.
    #[serde(rename = "shutdown_grace_ms", deserialize_with = "duration::millis")]
    pub shutdown_grace: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            password: DEFAULT_PASSWORD.to_string(),
            auth_response_delay: Duration::ZERO,
            command_response_delay: Duration::ZERO,
            exit_command: DEFAULT_EXIT_COMMAND.to_string(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl ServerSettings {
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    #[must_use]
    pub const fn with_auth_response_delay(mut self, delay: Duration) -> Self {
        self.auth_response_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_command_response_delay(mut self, delay: Duration) -> Self {
        self.command_response_delay = delay;
        self
    }

    #[must_use]
    pub fn with_exit_command(mut self, command: impl Into<String>) -> Self {
        self.exit_command = command.into();
        self
    }

    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}
