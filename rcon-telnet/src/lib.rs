//! Client for password-gated game server telnet consoles, such as the one
//! 7 Days to Die dedicated servers expose.
//!
//! ```no_run
//! use rcon_telnet::{Connection, Settings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut connection = Connection::dial(
//!     "127.0.0.1:8081",
//!     "banana",
//!     Settings::default().with_clear_response(true),
//! )
//! .await?;
//!
//! println!("{}", connection.status());
//! println!("{}", connection.execute("help").await?);
//!
//! connection.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod interactive;
pub mod settings;

pub use connection::Connection;
pub use error::{Error, Result};
pub use interactive::dial_interactive;
pub use rcon_telnet_common::{logging, protocol};
pub use settings::Settings;

/// Connect and log in. Shorthand for [`Connection::dial`].
///
/// # Errors
///
/// See [`Connection::dial`].
pub async fn dial(address: &str, password: &str, settings: Settings) -> Result<Connection> {
    Connection::dial(address, password, settings).await
}
