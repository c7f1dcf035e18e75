//! A controllable stand-in for a 7 Days to Die telnet console, for testing
//! console clients end to end.
//!
//! ```no_run
//! use rcon_telnet_mock::{Server, ServerSettings};
//!
//! # async fn example() -> Result<(), rcon_telnet_mock::ServerError> {
//! let mut server = Server::new(ServerSettings::default().with_password("banana")).await?;
//! println!("listening on {}", server.addr());
//!
//! server.close().await
//! # }
//! ```

pub mod auth;
pub mod context;
pub mod error;
pub mod handler;
pub mod server;
pub mod settings;

pub use auth::{AUTH_ATTEMPT_LIMIT, Attempts, AuthPhase};
pub use context::{AuthOutcome, Context};
pub use error::ServerError;
pub use handler::{AuthHandler, Handler, HelpHandler};
pub use server::{ERROR_QUEUE_CAPACITY, Server, ServerHandle};
pub use settings::ServerSettings;

/// Server banner sent after a successful login, as a client reports it.
pub const WELCOME_BANNER: &str = "*** Connected with 7DTD server.\r\n\
*** Server version: Alpha 18.4 (b4) Compatibility Version: Alpha 18.4\r\n\
*** Dedicated server only build\r\n\
\r\n\
Server IP:   127.0.0.1\r\n\
Server port: 26900\r\n\
Max players: 8\r\n\
Game mode:   GameModeSurvival\r\n\
World:       Navezgane\r\n\
Game name:   My Game\r\n\
Difficulty:  2";

/// Password that makes [`AuthHandler`] answer with something no real server
/// would say.
pub const UNEXPECTED_PASSWORD: &str = "unexpect";
pub const UNEXPECTED_RESPONSE: &str = "My spoon is too big";

/// The one command [`HelpHandler`] knows.
pub const HELP_COMMAND: &str = "help";
pub const HELP_RESPONSE: &str = "lorem ipsum dolor sit amet";
