//! An authenticated console connection.
//!
//! The console protocol carries no framing or request ids, so a reply is
//! whatever the server sends during a fixed window after the command is
//! written. A background task copies every byte the server sends into a
//! queue; [`Connection::execute`] writes the command, sleeps for
//! `execute_tick`, then takes everything queued so far as the reply.
//!
//! A reply that arrives after the window is handed to the next `execute`.

use std::{io, net::SocketAddr, time::Duration};

use rcon_telnet_common::{
    incoming, internal, outgoing,
    protocol::{
        CRLF, MAX_COMMAND_LEN, NULL_STRING, RECEIVE_WAIT_PERIOD, RESPONSE_AUTH_INCORRECT_PASSWORD,
        RESPONSE_AUTH_SUCCESS, RESPONSE_ENTER_PASSWORD, RESPONSE_WELCOME, executing_command_line,
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
    task::JoinHandle,
};

use crate::{Error, Result, Settings};

/// Size of a single read performed by the relay task.
const READ_CHUNK_SIZE: usize = 4096;

/// A connection to a telnet console that has passed the password check.
///
/// Commands are strictly sequential: `execute` takes `&mut self`, so two
/// commands can never share a reply window.
pub struct Connection {
    writer: OwnedWriteHalf,
    responses: mpsc::UnboundedReceiver<Vec<u8>>,
    relay: JoinHandle<()>,
    settings: Settings,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    status: String,
}

impl Connection {
    /// Connect to `address`, log in with `password` and return the
    /// authenticated connection.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the TCP connection cannot be established within
    ///   `settings.dial_timeout`, or the password cannot be written
    /// - [`Error::CommandEmpty`] / [`Error::CommandTooLong`] for an unusable password
    /// - [`Error::AuthFailed`] if the server rejected the password
    /// - [`Error::AuthUnexpectedMessage`] if the server's answer was not recognised
    /// - [`Error::Multiple`] if closing the connection after a failed login
    ///   failed too
    #[tracing::instrument(level = tracing::Level::DEBUG, skip(password, settings), err)]
    pub async fn dial(address: &str, password: &str, settings: Settings) -> Result<Self> {
        let stream = connect(address, settings.dial_timeout).await?;
        let mut connection = Self::from_stream(stream, settings)?;

        if let Err(err) = connection.auth(password).await {
            internal!(level = DEBUG, "Login to {address} failed: {err}");

            return match connection.close().await {
                Ok(()) => Err(err),
                Err(close) => Err(Error::Multiple {
                    close: Box::new(close),
                    previous: Box::new(err),
                }),
            };
        }

        internal!(level = DEBUG, "Logged in to {address}");
        Ok(connection)
    }

    /// Split the stream and start the one relay task this connection will have.
    fn from_stream(stream: TcpStream, settings: Settings) -> io::Result<Self> {
        let local_addr = stream.local_addr()?;
        let remote_addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        let (sink, responses) = mpsc::unbounded_channel();

        Ok(Self {
            writer,
            responses,
            relay: tokio::spawn(relay_responses(reader, sink)),
            settings,
            local_addr,
            remote_addr,
            status: String::new(),
        })
    }

    /// Send `command` and return whatever the server answered within the
    /// reply window.
    ///
    /// With `clear_response` enabled, the server's
    /// `INF Executing command '<command>' by Telnet from <addr>` echo and
    /// everything before it is removed from the reply.
    ///
    /// # Errors
    ///
    /// [`Error::CommandEmpty`] and [`Error::CommandTooLong`] are raised before
    /// anything is written; [`Error::Io`] if the write fails.
    pub async fn execute(&mut self, command: &str) -> Result<String> {
        validate_command(command)?;
        outgoing!(level = DEBUG, "{command}");

        let response = self.execute_raw(command).await?;

        if self.settings.clear_response {
            let echo = format!("{}{CRLF}", executing_command_line(command, self.local_addr));
            if let Some((_, reply)) = response.split_once(echo.as_str()) {
                return Ok(reply.to_string());
            }
        }

        Ok(response)
    }

    /// The server banner captured at login, stripped of the login framing.
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub const fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Politely end the session: send the exit command, give the last bytes
    /// a moment, then close the socket.
    ///
    /// A failure to send the exit command is ignored.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if shutting the socket down fails.
    #[tracing::instrument(level = tracing::Level::DEBUG, skip(self), fields(remote = %self.remote_addr), err)]
    pub async fn close(mut self) -> Result<()> {
        let exit = format!("{}{CRLF}", self.settings.exit_command);
        if let Err(err) = self.writer.write_all(exit.as_bytes()).await {
            internal!("Unable to send exit command: {err}");
        }

        tokio::time::sleep(RECEIVE_WAIT_PERIOD).await;

        let result = self.writer.shutdown().await;
        self.relay.abort();

        match result {
            // The peer may already be gone after seeing the exit command.
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other.map_err(Error::from),
        }
    }

    /// Log in by sending the password like any other command and reading
    /// the banner that comes back.
    async fn auth(&mut self, password: &str) -> Result<()> {
        let response = self.execute_raw(password).await?;

        if response.contains(RESPONSE_AUTH_INCORRECT_PASSWORD) {
            return Err(Error::AuthFailed);
        }

        if !response.contains(RESPONSE_AUTH_SUCCESS) {
            return Err(Error::AuthUnexpectedMessage);
        }

        self.status = status_from_banner(&response);

        Ok(())
    }

    async fn execute_raw(&mut self, command: &str) -> Result<String> {
        validate_command(command)?;

        self.writer
            .write_all(format!("{command}{CRLF}").as_bytes())
            .await?;

        tokio::time::sleep(self.settings.execute_tick).await;

        Ok(clean_response(&self.drain()))
    }

    /// Take everything the relay has received so far, leaving the queue empty.
    fn drain(&mut self) -> Vec<u8> {
        let mut response = Vec::new();
        while let Ok(chunk) = self.responses.try_recv() {
            response.extend_from_slice(&chunk);
        }

        response
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.relay.abort();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("local_addr", &self.local_addr)
            .field("remote_addr", &self.remote_addr)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Open a TCP connection, bounded by `timeout`.
pub(crate) async fn connect(address: &str, timeout: Duration) -> io::Result<TcpStream> {
    tokio::time::timeout(timeout, TcpStream::connect(address))
        .await
        .map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("dial tcp {address}: i/o timeout"),
            )
        })?
}

fn validate_command(command: &str) -> Result<()> {
    if command.is_empty() {
        return Err(Error::CommandEmpty);
    }

    if command.len() > MAX_COMMAND_LEN {
        return Err(Error::CommandTooLong);
    }

    Ok(())
}

fn clean_response(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .replace(NULL_STRING, "")
        .trim()
        .to_string()
}

/// Strip the password prompt, success marker and trailing help hint from the
/// login reply.
fn status_from_banner(response: &str) -> String {
    let prefix = format!("{RESPONSE_ENTER_PASSWORD}{CRLF}{RESPONSE_AUTH_SUCCESS}");
    let suffix = format!("{CRLF}{CRLF}{RESPONSE_WELCOME}");

    let status = response.strip_prefix(prefix.as_str()).unwrap_or(response);
    let status = status.strip_suffix(suffix.as_str()).unwrap_or(status);

    status.trim().to_string()
}

/// Copy every byte from the server into `sink` until the stream ends.
///
/// Read failures end the relay silently; the next `execute` simply sees an
/// empty queue or a write error.
async fn relay_responses(mut reader: OwnedReadHalf, sink: mpsc::UnboundedSender<Vec<u8>>) {
    let mut buffer = vec![0; READ_CHUNK_SIZE];

    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => {
                internal!("Server closed the connection");
                break;
            }
            Ok(n) => {
                incoming!("{:?}", String::from_utf8_lossy(&buffer[..n]));

                if sink.send(buffer[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(err) => {
                internal!("Relay stopped: {err}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn validate_rejects_empty_and_long_commands() {
        assert!(matches!(validate_command(""), Err(Error::CommandEmpty)));
        assert!(matches!(
            validate_command(&"\0".repeat(MAX_COMMAND_LEN + 1)),
            Err(Error::CommandTooLong)
        ));
        assert!(validate_command(&"a".repeat(MAX_COMMAND_LEN)).is_ok());
    }

    #[test]
    fn clean_response_drops_nulls_and_whitespace() {
        assert_eq!(clean_response(b"\r\n\0lorem\0 ipsum\r\n\0"), "lorem ipsum");
        assert_eq!(clean_response(b""), "");
    }

    #[test]
    fn status_strips_login_framing() {
        let response = format!(
            "{RESPONSE_ENTER_PASSWORD}{CRLF}{RESPONSE_AUTH_SUCCESS}{CRLF}{CRLF}{CRLF}{CRLF}\
             *** Connected with 7DTD server.{CRLF}Max players: 8{CRLF}{CRLF}{RESPONSE_WELCOME}"
        );

        assert_eq!(
            status_from_banner(&response),
            format!("*** Connected with 7DTD server.{CRLF}Max players: 8")
        );
    }

    #[test]
    fn status_keeps_unframed_text() {
        assert_eq!(
            status_from_banner(&format!("{RESPONSE_AUTH_SUCCESS} hello")),
            format!("{RESPONSE_AUTH_SUCCESS} hello")
        );
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore)]
    async fn relay_forwards_until_eof() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"one\r\n").await.unwrap();
            stream.write_all(b"two\r\n").await.unwrap();
        });

        let stream = TcpStream::connect(address).await.unwrap();
        let (reader, _writer) = stream.into_split();
        let (sink, mut responses) = mpsc::unbounded_channel();

        relay_responses(reader, sink).await;
        server.await.unwrap();

        let mut received = Vec::new();
        while let Ok(chunk) = responses.try_recv() {
            received.extend(chunk);
        }

        assert_eq!(received, b"one\r\ntwo\r\n");
    }
}
