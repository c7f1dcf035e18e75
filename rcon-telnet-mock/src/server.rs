//! The mock console server: accept loop, per-connection sessions and shutdown.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use rcon_telnet_common::{
    Signal, internal,
    protocol::{RESPONSE_AUTH_TOO_MANY_FAILS, RESPONSE_ENTER_PASSWORD},
    traits::FiniteStateMachine,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{broadcast, mpsc},
    task::{AbortHandle, JoinError, JoinHandle, JoinSet},
};

use crate::{
    auth::AuthPhase,
    context::{AuthOutcome, Context},
    error::ServerError,
    handler::{AuthHandler, Handler, HelpHandler},
    settings::ServerSettings,
};

/// Errors held for [`Server::take_errors`] before new ones are dropped.
pub const ERROR_QUEUE_CAPACITY: usize = 10;

type Sessions = JoinSet<()>;

/// State shared between the server handle, the accept loop and every session.
struct Shared {
    settings: RwLock<ServerSettings>,
    auth_handler: RwLock<Arc<dyn Handler>>,
    command_handler: RwLock<Arc<dyn Handler>>,
    connections: Mutex<HashMap<u64, AbortHandle>>,
    next_id: AtomicU64,
    errors: mpsc::Sender<ServerError>,
}

impl Shared {
    /// Queue `err` for [`Server::take_errors`], dropping it if nobody has
    /// made room.
    fn report(&self, err: ServerError) {
        internal!(level = ERROR, "{err}");

        match self.errors.try_send(err) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(err)) => {
                internal!(level = WARN, "Error queue full, dropping: {err}");
            }
            Err(mpsc::error::TrySendError::Closed(err)) => {
                internal!(level = WARN, "Error queue closed, dropping: {err}");
            }
        }
    }

    /// Start a session for `stream`. It is registered before it can run, so
    /// the forced sweep never misses it.
    fn spawn_session(self: &Arc<Self>, sessions: &mut Sessions, stream: TcpStream, peer: SocketAddr) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(self);

        let mut connections = self.connections.lock();
        let handle = sessions.spawn(async move {
            let _registration = Registration {
                shared: Arc::clone(&shared),
                id,
            };

            match run_session(&shared, stream).await {
                Ok(()) => internal!(level = DEBUG, "Session with {peer} finished"),
                Err(err) if err.is_disconnect() => {
                    internal!(level = DEBUG, "{peer} went away: {err}");
                }
                Err(err) => shared.report(err),
            }
        });
        connections.insert(id, handle);
    }

    /// Abort every connection still registered.
    fn force_close(&self) {
        let live = std::mem::take(&mut *self.connections.lock());

        for (id, handle) in live {
            internal!(level = DEBUG, "Force-closing connection {id}");
            handle.abort();
        }
    }
}

/// A handle on the server a connection belongs to, given to handlers through
/// [`Context::server`].
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    /// The server's current settings, which may differ from the snapshot
    /// in [`Context::settings`].
    #[must_use]
    pub fn settings(&self) -> ServerSettings {
        self.shared.settings.read().clone()
    }

    #[must_use]
    pub fn live_connections(&self) -> usize {
        self.shared.connections.lock().len()
    }

    /// Queue `err` for [`Server::take_errors`] without ending the session.
    pub fn report(&self, err: ServerError) {
        self.shared.report(err);
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("live_connections", &self.live_connections())
            .finish_non_exhaustive()
    }
}

/// Removes a session from the registry however it ends.
struct Registration {
    shared: Arc<Shared>,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.shared.connections.lock().remove(&self.id);
    }
}

/// A telnet console server bound to a free port on the loopback interface.
///
/// Each connection is greeted with the password prompt, runs the auth handler
/// until it reaches a decision, and, if accepted, has every command line
/// passed to the command handler. A line equal to the exit command ends the
/// session.
pub struct Server {
    shared: Arc<Shared>,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    quit: broadcast::Sender<Signal>,
    accept: Option<JoinHandle<(Sessions, Vec<ServerError>)>>,
    errors: mpsc::Receiver<ServerError>,
    closed: bool,
}

impl Server {
    /// Bind and start accepting.
    ///
    /// # Errors
    ///
    /// [`ServerError::Io`] if no local port can be bound.
    pub async fn new(settings: ServerSettings) -> Result<Self, ServerError> {
        let mut server = Self::unstarted(settings).await?;
        server.start()?;

        Ok(server)
    }

    /// Bind without accepting, so handlers and settings can be changed
    /// before the first client arrives. Call [`start`](Self::start) when
    /// ready.
    ///
    /// # Errors
    ///
    /// [`ServerError::Io`] if no local port can be bound.
    pub async fn unstarted(settings: ServerSettings) -> Result<Self, ServerError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let local_addr = listener.local_addr()?;
        let (errors_tx, errors) = mpsc::channel(ERROR_QUEUE_CAPACITY);
        let (quit, _) = broadcast::channel(1);

        Ok(Self {
            shared: Arc::new(Shared {
                settings: RwLock::new(settings),
                auth_handler: RwLock::new(Arc::new(AuthHandler)),
                command_handler: RwLock::new(Arc::new(HelpHandler)),
                connections: Mutex::default(),
                next_id: AtomicU64::default(),
                errors: errors_tx,
            }),
            listener: Some(listener),
            local_addr,
            quit,
            accept: None,
            errors,
            closed: false,
        })
    }

    /// Begin accepting connections.
    ///
    /// # Errors
    ///
    /// [`ServerError::AlreadyStarted`] on a second call,
    /// [`ServerError::Closed`] after [`close`](Self::close).
    pub fn start(&mut self) -> Result<(), ServerError> {
        if self.closed {
            return Err(ServerError::Closed);
        }

        let listener = self.listener.take().ok_or(ServerError::AlreadyStarted)?;
        internal!(level = DEBUG, "Accepting connections on {}", self.local_addr);

        self.accept = Some(tokio::spawn(accept_loop(
            Arc::clone(&self.shared),
            listener,
            self.quit.subscribe(),
        )));

        Ok(())
    }

    /// Replace the handler that decides logins. Applies to connections
    /// accepted from now on.
    pub fn set_auth_handler(&self, handler: impl Handler + 'static) {
        *self.shared.auth_handler.write() = Arc::new(handler);
    }

    /// Replace the handler that answers commands. Applies to connections
    /// accepted from now on.
    pub fn set_command_handler(&self, handler: impl Handler + 'static) {
        *self.shared.command_handler.write() = Arc::new(handler);
    }

    #[must_use]
    pub fn settings(&self) -> ServerSettings {
        self.shared.settings.read().clone()
    }

    pub fn set_settings(&self, settings: ServerSettings) {
        *self.shared.settings.write() = settings;
    }

    /// Edit the settings in place. Do not hold the guard across an `.await`.
    pub fn settings_mut(&self) -> RwLockWriteGuard<'_, ServerSettings> {
        self.shared.settings.write()
    }

    /// The bound address, as `ip:port`.
    #[must_use]
    pub fn addr(&self) -> String {
        self.local_addr.to_string()
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle sharing this server's settings, error queue and registry.
    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Connections accepted and not yet finished.
    #[must_use]
    pub fn live_connections(&self) -> usize {
        self.shared.connections.lock().len()
    }

    /// Everything reported since the last call, oldest first.
    pub fn take_errors(&mut self) -> Vec<ServerError> {
        let mut errors = Vec::new();
        while let Ok(err) = self.errors.try_recv() {
            errors.push(err);
        }

        errors
    }

    /// Stop the server.
    ///
    /// Accepting stops at once. Sessions get `shutdown_grace` to finish on
    /// their own; whatever is still connected after that, for example a
    /// client that never sent a password, is force-closed. Calling `close`
    /// again does nothing.
    ///
    /// # Errors
    ///
    /// [`ServerError::Shutdown`] with every session or accept task that
    /// panicked.
    #[tracing::instrument(level = tracing::Level::DEBUG, skip(self), fields(addr = %self.local_addr), err)]
    pub async fn close(&mut self) -> Result<(), ServerError> {
        if self.closed {
            return Ok(());
        }

        self.closed = true;
        self.listener = None;
        let _ = self.quit.send(Signal::Shutdown);

        let mut failures = Vec::new();

        if let Some(accept) = self.accept.take() {
            match accept.await {
                Ok((mut sessions, mut errors)) => {
                    failures.append(&mut errors);
                    self.shared.force_close();

                    while let Some(finished) = sessions.join_next().await {
                        collect_failure(finished, &mut failures);
                    }
                }
                Err(err) => {
                    self.shared.force_close();
                    failures.push(err.into());
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ServerError::Shutdown(failures))
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        let _ = self.quit.send(Signal::Shutdown);

        // Dropping the accept loop's task set aborts every session with it.
        if let Some(accept) = self.accept.take() {
            accept.abort();
        }

        self.shared.force_close();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("started", &self.listener.is_none())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

async fn accept_loop(
    shared: Arc<Shared>,
    listener: TcpListener,
    mut quit: broadcast::Receiver<Signal>,
) -> (Sessions, Vec<ServerError>) {
    let mut sessions = Sessions::new();
    let mut failures = Vec::new();

    loop {
        tokio::select! {
            biased;

            _ = quit.recv() => {
                internal!(level = DEBUG, "Received shutdown signal, no longer accepting");
                break;
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    internal!(level = DEBUG, "Connection received from {peer}");
                    shared.spawn_session(&mut sessions, stream, peer);
                }
                Err(err) => shared.report(err.into()),
            },

            // Finished sessions are reaped as they go; only panics are of interest.
            Some(Err(err)) = sessions.join_next(), if !sessions.is_empty() => {
                if !err.is_cancelled() {
                    shared.report(err.into());
                }
            }
        }
    }

    drop(listener);

    let grace = shared.settings.read().shutdown_grace;
    let drained = tokio::time::timeout(grace, async {
        while let Some(finished) = sessions.join_next().await {
            collect_failure(finished, &mut failures);
        }
    })
    .await;

    if drained.is_err() {
        internal!(
            level = DEBUG,
            "{} connection(s) still open after {grace:?}",
            sessions.len()
        );
    }

    (sessions, failures)
}

fn collect_failure(finished: Result<(), JoinError>, failures: &mut Vec<ServerError>) {
    match finished {
        Err(err) if !err.is_cancelled() => failures.push(err.into()),
        _ => {}
    }
}

async fn run_session(shared: &Arc<Shared>, stream: TcpStream) -> Result<(), ServerError> {
    let server = ServerHandle {
        shared: Arc::clone(shared),
    };
    let mut ctx = Context::new(stream, server)?;

    ctx.write_line(RESPONSE_ENTER_PASSWORD).await?;
    ctx.flush().await?;

    if authenticate(shared, &mut ctx).await? {
        serve_commands(shared, &mut ctx).await?;
    }

    ctx.flush().await?;
    Ok(())
}

/// Run the login exchange. Returns whether the client got in.
async fn authenticate(shared: &Shared, ctx: &mut Context) -> Result<bool, ServerError> {
    let handler = Arc::clone(&*shared.auth_handler.read());
    let mut phase = AuthPhase::AwaitingPassword;

    while !phase.is_terminal() {
        let Some(attempt) = ctx.read_password().await? else {
            internal!(level = DEBUG, "{} left during login", ctx.peer_addr());
            return Ok(false);
        };

        if !ctx.settings().auth_response_delay.is_zero() {
            tokio::time::sleep(ctx.settings().auth_response_delay).await;
        }

        ctx.request = attempt;
        ctx.auth = AuthOutcome::default();
        handler.handle(ctx).await?;

        phase = phase.transition(ctx.auth, &mut ctx.attempts);
        ctx.flush().await?;
    }

    internal!(level = DEBUG, "Login from {} ended in {phase:?}", ctx.peer_addr());

    if phase == AuthPhase::TooManyAttempts {
        ctx.write_line(RESPONSE_AUTH_TOO_MANY_FAILS).await?;
    }

    Ok(phase == AuthPhase::Success)
}

/// Hand each command line to the command handler until the client leaves or
/// sends the exit command. Blank lines are skipped.
async fn serve_commands(shared: &Shared, ctx: &mut Context) -> Result<(), ServerError> {
    let handler = Arc::clone(&*shared.command_handler.read());

    while let Some(line) = ctx.read_line().await? {
        if line.is_empty() {
            continue;
        }

        if !ctx.settings().command_response_delay.is_zero() {
            tokio::time::sleep(ctx.settings().command_response_delay).await;
        }

        if line == ctx.settings().exit_command {
            internal!(level = DEBUG, "{} sent the exit command", ctx.peer_addr());
            break;
        }

        ctx.request = line;
        match handler.handle(ctx).await {
            Ok(()) => {}
            Err(err) if err.is_disconnect() => return Err(err),
            Err(err) => shared.report(err),
        }

        ctx.flush().await?;
    }

    Ok(())
}
