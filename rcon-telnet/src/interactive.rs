//! Terminal-style sessions: lines from an input stream go to the server,
//! everything the server sends goes to an output stream.

use std::io;

use rcon_telnet_common::{
    internal, outgoing,
    protocol::{CRLF, FORCED_EXIT_COMMAND, RECEIVE_WAIT_PERIOD},
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    net::tcp::OwnedWriteHalf,
};

use crate::{Result, Settings, connection::connect};

/// Run an interactive console session.
///
/// Each line read from `input` is sent to the server at `address`, with
/// `:q` replaced by the configured exit command. Server output is copied to
/// `output` as it arrives. The session ends once the exit command has been
/// sent or `input` runs dry.
///
/// An empty `password` sends nothing up front, leaving the first input line
/// to answer the password prompt.
///
/// # Errors
///
/// Returns [`Error::Io`](crate::Error::Io) if connecting, reading `input`
/// or writing to the server fails.
#[tracing::instrument(level = tracing::Level::DEBUG, skip(input, output, password, settings), err)]
pub async fn dial_interactive<R, W>(
    input: R,
    output: W,
    address: &str,
    password: &str,
    settings: Settings,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let stream = connect(address, settings.dial_timeout).await?;
    let (mut reader, mut writer) = stream.into_split();

    if !password.is_empty() {
        send_line(&mut writer, password).await?;
    }

    let mut relay = tokio::spawn(async move {
        let mut output = output;
        let copied = tokio::io::copy(&mut reader, &mut output).await;
        let _ = output.flush().await;
        copied
    });

    let mut exited = false;
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        let command = if line == FORCED_EXIT_COMMAND {
            settings.exit_command.as_str()
        } else {
            line.as_str()
        };

        outgoing!(level = DEBUG, "{command}");
        send_line(&mut writer, command).await?;

        if command == settings.exit_command {
            exited = true;
            break;
        }
    }

    tokio::time::sleep(RECEIVE_WAIT_PERIOD).await;

    if !exited {
        let _ = send_line(&mut writer, &settings.exit_command).await;
        tokio::time::sleep(RECEIVE_WAIT_PERIOD).await;
    }

    match writer.shutdown().await {
        Err(err) if err.kind() != io::ErrorKind::NotConnected => {
            relay.abort();
            return Err(err.into());
        }
        _ => {}
    }

    // Let the server's final words reach the output before returning.
    match tokio::time::timeout(settings.dial_timeout, &mut relay).await {
        Ok(Ok(Ok(copied))) => internal!("Relayed {copied} bytes"),
        Ok(Ok(Err(err))) => internal!("Relay stopped: {err}"),
        Ok(Err(err)) => internal!(level = WARN, "Relay task failed: {err}"),
        Err(_) => {
            internal!(level = DEBUG, "Server kept the connection open, dropping it");
            relay.abort();
        }
    }

    Ok(())
}

async fn send_line(writer: &mut OwnedWriteHalf, line: &str) -> io::Result<()> {
    writer.write_all(format!("{line}{CRLF}").as_bytes()).await
}
