//! End-to-end tests for interactive sessions.

use std::time::Duration;

use rcon_telnet::{
    Settings, dial_interactive,
    protocol::{RESPONSE_AUTH_SUCCESS, RESPONSE_ENTER_PASSWORD},
};
use rcon_telnet_mock::{HELP_RESPONSE, Server, ServerSettings, WELCOME_BANNER};
use tokio::io::AsyncReadExt;

async fn run_session(password: &str, input: &[u8]) -> String {
    rcon_telnet::logging::init();

    let mut server = Server::new(ServerSettings::default()).await.unwrap();
    let (output, mut received) = tokio::io::duplex(64 * 1024);

    dial_interactive(
        input,
        output,
        &server.addr(),
        password,
        Settings::default().with_dial_timeout(Duration::from_secs(2)),
    )
    .await
    .unwrap();

    let mut transcript = String::new();
    received.read_to_string(&mut transcript).await.unwrap();

    server.close().await.unwrap();
    assert!(server.take_errors().is_empty());

    transcript
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_interactive_forced_exit() {
    let transcript = run_session("password", b"help\n:q\nnever sent\n").await;

    assert!(transcript.starts_with(RESPONSE_ENTER_PASSWORD), "{transcript}");
    assert!(transcript.contains(RESPONSE_AUTH_SUCCESS), "{transcript}");
    assert!(transcript.contains(WELCOME_BANNER), "{transcript}");
    assert!(transcript.contains(HELP_RESPONSE), "{transcript}");
    assert!(!transcript.contains("never sent"), "{transcript}");
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_interactive_password_from_input() {
    let transcript = run_session("", b"password\nhelp\n").await;

    assert!(transcript.contains(WELCOME_BANNER), "{transcript}");
    assert!(transcript.contains(HELP_RESPONSE), "{transcript}");
}
