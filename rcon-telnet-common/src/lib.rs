//! Pieces shared by the telnet console client and the mock server: the wire
//! vocabulary, logging helpers and a couple of small traits.

pub mod duration;
pub mod logging;
pub mod protocol;
pub mod traits;

pub use tracing;

/// Lifecycle signal broadcast to background tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
