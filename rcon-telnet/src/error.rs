//! Error types for the telnet console client.

use std::io;

use thiserror::Error;

/// Errors that can occur when talking to a telnet console.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure, passed through exactly as the socket layer raised it.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The command was empty. Nothing was sent.
    #[error("command too small")]
    CommandEmpty,

    /// The command was longer than `MAX_COMMAND_LEN` bytes. Nothing was sent.
    #[error("command too long")]
    CommandTooLong,

    /// The server answered the password with its incorrect-password prompt.
    #[error("authentication failed")]
    AuthFailed,

    /// The server answered the password with neither the success nor the
    /// incorrect-password marker.
    #[error("unexpected authentication response")]
    AuthUnexpectedMessage,

    /// Closing the connection after a failed login failed as well.
    #[error("an error occurred while handling another error: {close}. Previous error: {previous}")]
    Multiple {
        close: Box<Error>,
        previous: Box<Error>,
    },
}

impl Error {
    /// Returns `true` if the server did not accept the login, for either reason.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::AuthFailed | Self::AuthUnexpectedMessage)
    }

    /// The error that caused the others, following `Multiple` chains.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Multiple { previous, .. } => previous.root(),
            other => other,
        }
    }
}

/// Specialized `Result` type for console operations.
pub type Result<T> = std::result::Result<T, Error>;
