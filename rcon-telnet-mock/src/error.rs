//! Error types for the mock console server

use std::io;

use thiserror::Error;

/// Errors raised by the mock server and its handlers
#[derive(Debug, Error)]
pub enum ServerError {
    /// I/O error on the listener or a client connection
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `start` was called on a server that is already accepting
    #[error("server already started")]
    AlreadyStarted,

    /// `start` was called after `close`
    #[error("server closed")]
    Closed,

    /// A handler gave up on a request
    #[error("handler error: {0}")]
    Handler(String),

    /// A connection or accept task panicked
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Everything that went wrong while shutting down
    #[error("shutdown failed: {}", join_messages(.0))]
    Shutdown(Vec<ServerError>),
}

impl ServerError {
    /// Returns `true` if the error only means the client went away.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Io(err) if matches!(
                err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::UnexpectedEof
            )
        )
    }
}

fn join_messages(errors: &[ServerError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(". Previous error: ")
}
