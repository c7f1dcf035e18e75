//! Runs against a real server when `TEST_7DTD_SERVER=true`.
//!
//! The address and password come from `TEST_7DTD_SERVER_ADDR` and
//! `TEST_7DTD_SERVER_PASSWORD`.

use std::env;

use rcon_telnet::Settings;

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_live_server() {
    if env::var("TEST_7DTD_SERVER").as_deref() != Ok("true") {
        return;
    }

    let address = env::var("TEST_7DTD_SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8081".into());
    let password = env::var("TEST_7DTD_SERVER_PASSWORD").unwrap_or_else(|_| "banana".into());

    let mut connection = rcon_telnet::dial(
        &address,
        &password,
        Settings::default().with_clear_response(true),
    )
    .await
    .unwrap();

    assert!(!connection.status().is_empty());

    let response = connection.execute("version").await.unwrap();
    assert!(!response.is_empty());

    connection.close().await.unwrap();
}
