//! Vocabulary of the 7 Days to Die style telnet console.
//!
//! The protocol has no framing: every message is plain text terminated by
//! [`CRLF`], and replies are only told apart by the pauses between them.

use std::{fmt::Display, time::Duration};

/// Line terminator used in both directions.
pub const CRLF: &str = "\r\n";

/// A null byte as it sometimes shows up padding server output.
pub const NULL_STRING: &str = "\x00";

/// Longest command the client agrees to send, in bytes.
pub const MAX_COMMAND_LEN: usize = 1000;

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_EXIT_COMMAND: &str = "exit";

/// Local-only token that interactive mode swaps for the exit command.
pub const FORCED_EXIT_COMMAND: &str = ":q";

/// Pause given to the last bytes of a session before the socket goes away.
pub const RECEIVE_WAIT_PERIOD: Duration = Duration::from_millis(3);

/// Fixed time a command waits for its reply before the buffer is drained.
pub const EXECUTE_TICK_TIMEOUT: Duration = Duration::from_secs(1);

pub const RESPONSE_ENTER_PASSWORD: &str = "Please enter password";
pub const RESPONSE_AUTH_SUCCESS: &str = "Logon successful.";
pub const RESPONSE_AUTH_INCORRECT_PASSWORD: &str = "Password incorrect, please enter password:";
pub const RESPONSE_AUTH_TOO_MANY_FAILS: &str = "Too many failed login attempts!";
pub const RESPONSE_WELCOME: &str =
    "Press 'help' to get a list of all commands. Press 'exit' to end session.";

/// The diagnostic line a server logs when it runs a console command, minus
/// the leading timestamp.
#[must_use]
pub fn executing_command_line(command: &str, address: impl Display) -> String {
    format!("INF Executing command '{command}' by Telnet from {address}")
}

/// The reply a server gives to a command it does not know.
#[must_use]
pub fn unknown_command_line(command: &str) -> String {
    format!("*** ERROR: unknown command '{command}'")
}
