//! Pluggable request handling for the mock server.

use async_trait::async_trait;
use chrono::Utc;
use rcon_telnet_common::protocol::{
    CRLF, RESPONSE_AUTH_INCORRECT_PASSWORD, RESPONSE_AUTH_SUCCESS, RESPONSE_WELCOME,
    executing_command_line, unknown_command_line,
};

use crate::{
    HELP_COMMAND, HELP_RESPONSE, UNEXPECTED_PASSWORD, UNEXPECTED_RESPONSE, WELCOME_BANNER,
    context::Context, error::ServerError,
};

/// Answers a single request.
///
/// The server stores `ctx.request` before calling [`handle`](Self::handle) and
/// flushes the writer afterwards. As an auth handler, the outcome is signalled
/// through [`Context::authenticate`] and [`Context::reject`]; leaving both
/// untouched asks for another attempt.
#[async_trait]
pub trait Handler: Send + Sync {
    /// # Errors
    ///
    /// Errors are reported through the server's error queue. I/O errors that
    /// only mean the client went away end the connection quietly.
    async fn handle(&self, ctx: &mut Context) -> Result<(), ServerError>;
}

/// Login the way a 7 Days to Die server does it.
///
/// The configured password is accepted with the welcome banner,
/// [`UNEXPECTED_PASSWORD`] gets a reply no client would recognise, anything
/// else gets the incorrect-password prompt (except on the final attempt, where
/// the server follows up with its own refusal).
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthHandler;

#[async_trait]
impl Handler for AuthHandler {
    async fn handle(&self, ctx: &mut Context) -> Result<(), ServerError> {
        if ctx.request == ctx.settings().password {
            ctx.write_line(&format!("{RESPONSE_AUTH_SUCCESS}{CRLF}{CRLF}{CRLF}"))
                .await?;
            ctx.write_line(&format!("{WELCOME_BANNER}{CRLF}{CRLF}{RESPONSE_WELCOME}{CRLF}"))
                .await?;
            ctx.authenticate();
        } else if ctx.request == UNEXPECTED_PASSWORD {
            ctx.write_line(&format!("{UNEXPECTED_RESPONSE}{CRLF}")).await?;
            ctx.reject();
        } else if !ctx.is_last_attempt() {
            ctx.write_line(RESPONSE_AUTH_INCORRECT_PASSWORD).await?;
        }

        Ok(())
    }
}

/// Command handling with a single known command, [`HELP_COMMAND`].
///
/// Every command is logged back the way the real server echoes it, followed
/// by [`HELP_RESPONSE`] or the unknown-command error.
#[derive(Debug, Default, Clone, Copy)]
pub struct HelpHandler;

#[async_trait]
impl Handler for HelpHandler {
    async fn handle(&self, ctx: &mut Context) -> Result<(), ServerError> {
        if ctx.request.is_empty() {
            return Ok(());
        }

        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3f");
        let echo = executing_command_line(&ctx.request, ctx.peer_addr());
        ctx.write_line(&format!("{timestamp} {echo}")).await?;

        if ctx.request == HELP_COMMAND {
            ctx.write_line(HELP_RESPONSE).await?;
        } else {
            let error = unknown_command_line(&ctx.request);
            ctx.write_line(&error).await?;
        }

        Ok(())
    }
}
