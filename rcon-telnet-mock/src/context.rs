//! Per-connection state handed to [`Handler`](crate::Handler)s.

use std::{io, net::SocketAddr};

use rcon_telnet_common::{incoming, outgoing, protocol::CRLF};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

use crate::{auth::Attempts, server::ServerHandle, settings::ServerSettings};

/// What the auth handler decided about the latest attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthOutcome {
    pub success: bool,
    /// No further attempts will be read.
    pub terminal: bool,
}

/// Everything a handler needs to answer one request on one connection.
pub struct Context {
    server: ServerHandle,
    settings: ServerSettings,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,

    /// The password attempt or command line being handled.
    pub request: String,
    pub(crate) attempts: Attempts,
    pub(crate) auth: AuthOutcome,
}

impl Context {
    pub(crate) fn new(stream: TcpStream, server: ServerHandle) -> io::Result<Self> {
        let settings = server.settings();
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        let (reader, writer) = stream.into_split();

        Ok(Self {
            server,
            settings,
            peer_addr,
            local_addr,
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            request: String::new(),
            attempts: Attempts::default(),
            auth: AuthOutcome::default(),
        })
    }

    /// The server this connection was accepted by.
    #[must_use]
    pub const fn server(&self) -> &ServerHandle {
        &self.server
    }

    /// The settings in force when this connection was accepted.
    #[must_use]
    pub const fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub const fn auth(&self) -> AuthOutcome {
        self.auth
    }

    /// Whether the attempt being handled is the last one before the
    /// connection is turned away.
    #[must_use]
    pub const fn is_last_attempt(&self) -> bool {
        self.attempts.is_last()
    }

    /// Accept the login.
    pub const fn authenticate(&mut self) {
        self.auth = AuthOutcome {
            success: true,
            terminal: true,
        };
    }

    /// Refuse the login without allowing another attempt.
    pub const fn reject(&mut self) {
        self.auth = AuthOutcome {
            success: false,
            terminal: true,
        };
    }

    /// Direct access to the buffered read half, for handlers that consume
    /// more input than the server hands them.
    pub const fn reader_mut(&mut self) -> &mut BufReader<OwnedReadHalf> {
        &mut self.reader
    }

    /// Direct access to the buffered write half. Bytes written here are sent
    /// on the next flush, like everything else.
    pub const fn writer_mut(&mut self) -> &mut BufWriter<OwnedWriteHalf> {
        &mut self.writer
    }

    /// Queue `bytes` exactly as given, without a line ending.
    ///
    /// # Errors
    ///
    /// Any I/O error from the underlying socket.
    pub async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        outgoing!("{:?}", String::from_utf8_lossy(bytes));
        self.writer.write_all(bytes).await
    }

    /// Queue `text` followed by CRLF. Nothing reaches the client until
    /// [`flush`](Self::flush).
    ///
    /// # Errors
    ///
    /// Any I/O error from the underlying socket.
    pub async fn write_line(&mut self, text: &str) -> io::Result<()> {
        outgoing!("{text:?}");
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.write_all(CRLF.as_bytes()).await
    }

    /// # Errors
    ///
    /// Any I/O error from the underlying socket.
    pub async fn flush(&mut self) -> io::Result<()> {
        self.writer.flush().await
    }

    /// Read one login attempt.
    ///
    /// Real servers take at most as many bytes as the password is long, in a
    /// single read, whatever the client sent. Anything left over becomes the
    /// start of the next read. Trailing line endings are dropped.
    ///
    /// Returns `None` once the client has closed the connection.
    pub(crate) async fn read_password(&mut self) -> io::Result<Option<String>> {
        let expected = self.settings.password.len();
        if expected == 0 {
            return Ok(Some(String::new()));
        }

        let mut buffer = vec![0; expected];
        let read = self.reader.read(&mut buffer).await?;
        if read == 0 {
            return Ok(None);
        }

        let attempt = String::from_utf8_lossy(&buffer[..read]);
        incoming!("{attempt:?}");

        Ok(Some(attempt.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Read one command line without its line ending. Bytes that are not
    /// valid UTF-8 are replaced rather than failing the read.
    ///
    /// Returns `None` once the client has closed the connection.
    pub(crate) async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut raw = Vec::new();
        if self.reader.read_until(b'\n', &mut raw).await? == 0 {
            return Ok(None);
        }

        let line = raw.strip_suffix(b"\n").unwrap_or(raw.as_slice());
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let line = String::from_utf8_lossy(line);
        incoming!("{line:?}");

        Ok(Some(line.into_owned()))
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("peer_addr", &self.peer_addr)
            .field("local_addr", &self.local_addr)
            .field("request", &self.request)
            .field("attempts", &self.attempts)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}
