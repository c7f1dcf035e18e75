//! Drives the mock server with raw sockets.

use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use rcon_telnet_common::protocol::{
    RESPONSE_AUTH_INCORRECT_PASSWORD, RESPONSE_AUTH_SUCCESS, RESPONSE_AUTH_TOO_MANY_FAILS,
    RESPONSE_ENTER_PASSWORD, executing_command_line, unknown_command_line,
};
use rcon_telnet_mock::{
    AUTH_ATTEMPT_LIMIT, Context, HELP_RESPONSE, Handler, Server, ServerError, ServerSettings,
    UNEXPECTED_RESPONSE, WELCOME_BANNER,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

const WAIT: Duration = Duration::from_secs(2);

async fn connect(server: &Server) -> TcpStream {
    rcon_telnet_common::logging::init();

    TcpStream::connect(server.local_addr()).await.unwrap()
}

/// Read until the server hangs up.
async fn read_all(stream: &mut TcpStream) -> String {
    let mut received = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();

    String::from_utf8(received).unwrap()
}

struct Failing;

#[async_trait]
impl Handler for Failing {
    async fn handle(&self, ctx: &mut Context) -> Result<(), ServerError> {
        Err(ServerError::Handler(format!("cannot handle {}", ctx.request)))
    }
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_login_and_help() {
    let mut server = Server::new(ServerSettings::default()).await.unwrap();
    let mut stream = connect(&server).await;

    stream.write_all(b"password\r\nhelp\r\nHi!\r\nexit\r\n").await.unwrap();
    let transcript = read_all(&mut stream).await;

    assert!(transcript.starts_with(RESPONSE_ENTER_PASSWORD));
    assert!(transcript.contains(&format!("{RESPONSE_AUTH_SUCCESS}\r\n\r\n\r\n\r\n{WELCOME_BANNER}")));
    assert!(transcript.contains(&executing_command_line("help", stream.local_addr().unwrap())));
    assert!(transcript.contains(HELP_RESPONSE));
    assert!(transcript.contains(&unknown_command_line("Hi!")));

    server.close().await.unwrap();
    assert!(server.take_errors().is_empty());
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_unexpected_password() {
    let mut server = Server::new(ServerSettings::default()).await.unwrap();
    let mut stream = connect(&server).await;

    stream.write_all(b"unexpect\r\n").await.unwrap();
    let transcript = read_all(&mut stream).await;

    assert_eq!(
        transcript,
        format!("{RESPONSE_ENTER_PASSWORD}\r\n{UNEXPECTED_RESPONSE}\r\n\r\n")
    );

    server.close().await.unwrap();
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_too_many_attempts() {
    let mut server = Server::new(ServerSettings::default().with_password("pw"))
        .await
        .unwrap();
    let mut stream = connect(&server).await;

    stream
        .write_all("xx".repeat(AUTH_ATTEMPT_LIMIT).as_bytes())
        .await
        .unwrap();
    let transcript = read_all(&mut stream).await;

    assert_eq!(
        transcript.matches(RESPONSE_AUTH_INCORRECT_PASSWORD).count(),
        AUTH_ATTEMPT_LIMIT - 1
    );
    assert!(transcript.ends_with(&format!("{RESPONSE_AUTH_TOO_MANY_FAILS}\r\n")));

    server.close().await.unwrap();
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_start_twice() {
    let mut server = Server::unstarted(ServerSettings::default()).await.unwrap();

    server.start().unwrap();
    assert!(matches!(server.start(), Err(ServerError::AlreadyStarted)));

    server.close().await.unwrap();
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_settings_apply_to_new_connections() {
    let mut server = Server::unstarted(ServerSettings::default()).await.unwrap();
    server.settings_mut().password = "banana".to_string();
    server.start().unwrap();

    assert_eq!(server.settings().password, "banana");

    let mut stream = connect(&server).await;
    stream.write_all(b"banana\r\nexit\r\n").await.unwrap();
    assert!(read_all(&mut stream).await.contains(WELCOME_BANNER));

    server.set_settings(ServerSettings::default().with_exit_command("quit"));
    let mut stream = connect(&server).await;
    stream.write_all(b"password\r\nexit\r\nquit\r\n").await.unwrap();
    let transcript = read_all(&mut stream).await;
    assert!(transcript.contains(&unknown_command_line("exit")), "{transcript}");

    server.close().await.unwrap();
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_handler_errors_are_reported() {
    let mut server = Server::unstarted(ServerSettings::default()).await.unwrap();
    server.set_command_handler(Failing);
    server.start().unwrap();

    let mut stream = connect(&server).await;
    stream.write_all(b"password\r\nfirst\r\nsecond\r\nexit\r\n").await.unwrap();
    read_all(&mut stream).await;

    server.close().await.unwrap();

    let errors = server.take_errors();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].to_string(), "handler error: cannot handle first");
    assert_eq!(errors[1].to_string(), "handler error: cannot handle second");
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_close_is_idempotent() {
    let mut server = Server::new(ServerSettings::default()).await.unwrap();

    server.close().await.unwrap();
    server.close().await.unwrap();

    assert!(TcpStream::connect(server.local_addr()).await.is_err());
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_close_forces_stuck_login() {
    let mut server = Server::new(
        ServerSettings::default().with_shutdown_grace(Duration::from_millis(50)),
    )
    .await
    .unwrap();

    // Never sends a password, so its session waits in the login loop.
    let mut stream = connect(&server).await;
    let mut prompt = vec![0; RESPONSE_ENTER_PASSWORD.len()];
    stream.read_exact(&mut prompt).await.unwrap();
    assert_eq!(server.live_connections(), 1);

    timeout(WAIT, server.close()).await.unwrap().unwrap();
    assert_eq!(server.live_connections(), 0);

    let mut rest = Vec::new();
    let closed = timeout(WAIT, stream.read_to_end(&mut rest)).await.unwrap();
    assert!(closed.is_err() || rest == b"\r\n");
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_slow_login() {
    let delay = Duration::from_millis(200);
    let mut server = Server::new(ServerSettings::default().with_auth_response_delay(delay))
        .await
        .unwrap();
    let mut stream = connect(&server).await;

    let mut prompt = vec![0; RESPONSE_ENTER_PASSWORD.len() + 2];
    stream.read_exact(&mut prompt).await.unwrap();

    let started = tokio::time::Instant::now();
    stream.write_all(b"password\r\n").await.unwrap();

    let mut first = [0; 1];
    stream.read_exact(&mut first).await.unwrap();
    assert!(started.elapsed() >= delay);

    server.close().await.unwrap();
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_invalid_utf8_command_keeps_session() {
    let mut server = Server::new(ServerSettings::default()).await.unwrap();
    let mut stream = connect(&server).await;

    stream
        .write_all(b"password\r\nsay caf\xe9\r\nhelp\r\nexit\r\n")
        .await
        .unwrap();
    let transcript = read_all(&mut stream).await;

    assert!(transcript.contains(&unknown_command_line("say caf\u{fffd}")), "{transcript}");
    assert!(transcript.contains(HELP_RESPONSE), "{transcript}");

    server.close().await.unwrap();
    assert!(server.take_errors().is_empty());
}
