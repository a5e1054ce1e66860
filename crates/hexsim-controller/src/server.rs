//! Connection lifecycle.
//!
//! The controller listens on one TCP socket and admits a single client at a
//! time; both logical channels (commands in, status/config/telemetry out)
//! share that connection. Each admitted client gets a session: the command
//! loop runs on the session task and the publisher on a task of its own.
//! Ending the session (end of stream, I/O error or [`MockController::close_client`])
//! cancels the publisher, shuts the socket down and frees the slot for the
//! next client. Controller state survives from one session to the next
//! unless [`ServerConfig::reset_state_on_connect`] is set.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hexsim_metrics::{metric_defs, MetricLabels};
use hexsim_protocol::{decode_record, Command, ControllerState, ProtocolError, WireRecord};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::ControllerCore;
use crate::device::Device;
use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use crate::publisher::{self, write_frame, DEFAULT_TELEMETRY_INTERVAL};

/// Delay before accepting again after `accept` fails (e.g. out of file descriptors).
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How long a connection that arrives while the slot is taken waits for the
/// current session to end before it is rejected. A client that drops its
/// socket and reconnects at once is admitted within this window.
const ADMIT_GRACE: Duration = Duration::from_millis(500);

// ============================================================================
// Types
// ============================================================================

/// Where and how the controller serves.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Interface to bind, e.g. "127.0.0.1" or "::".
    pub host: String,
    /// Port to bind; 0 picks a free port.
    pub port: u16,
    /// Interval between telemetry frames.
    pub telemetry_interval: Duration,
    /// State set at start-up.
    pub initial_state: ControllerState,
    /// Also set `initial_state` whenever a client connects. When false the
    /// state carries over from the previous session.
    pub reset_state_on_connect: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            telemetry_interval: DEFAULT_TELEMETRY_INTERVAL,
            initial_state: ControllerState::Standby,
            reset_state_on_connect: false,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Error)]
enum SessionEnd {
    #[error("end of stream")]
    Eof,
    #[error("closed by the controller")]
    Closed,
    #[error("read failed: {0}")]
    ReadFailed(io::Error),
    #[error("write failed: {0}")]
    WriteFailed(io::Error),
    #[error("bad command: {0}")]
    Protocol(ProtocolError),
}

/// The admitted client.
struct Session {
    id: u64,
    /// Set to false to end the session.
    alive: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

/// State shared by the accept loop, the sessions and the [`MockController`] handle.
struct Shared<D: Device> {
    core: Arc<Mutex<ControllerCore<D>>>,
    dispatcher: Dispatcher<D>,
    config: ServerConfig,
    labels: MetricLabels,
    /// Lock order: `session` before `core`.
    session: Mutex<Option<Session>>,
    connected: watch::Sender<bool>,
    /// Cleared by [`MockController::close`]; no session starts afterwards.
    accepting: AtomicBool,
    next_session_id: AtomicU64,
}

// ============================================================================
// MockController
// ============================================================================

/// A running mock controller.
///
/// Dropping it stops accepting connections and ends the current session.
pub struct MockController<D: Device> {
    shared: Arc<Shared<D>>,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl<D: Device> MockController<D> {
    /// Bind the listening socket and start accepting clients.
    ///
    /// Fails only if the command table is invalid or the socket cannot be bound.
    pub async fn start(
        device: D,
        config: D::Config,
        telemetry: D::Telemetry,
        server_config: ServerConfig,
    ) -> Result<Self, ServerError> {
        let dispatcher = Dispatcher::new()?;

        let addr = format!("{}:{}", server_config.host, server_config.port);
        let listener = TcpListener::bind((server_config.host.as_str(), server_config.port))
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let core = ControllerCore::new(device, config, telemetry, server_config.initial_state);
        let (connected, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            core: Arc::new(Mutex::new(core)),
            dispatcher,
            labels: MetricLabels::new(D::NAME),
            config: server_config,
            session: Mutex::new(None),
            connected,
            accepting: AtomicBool::new(true),
            next_session_id: AtomicU64::new(1),
        });
        metrics::gauge!(metric_defs::CONNECTED.name, &shared.labels.to_labels()).set(0.0);

        info!(
            %local_addr,
            device = D::NAME,
            initial_state = %shared.config.initial_state,
            telemetry_interval = ?shared.config.telemetry_interval,
            "mock controller listening"
        );
        let accept_task = tokio::spawn(accept_loop(shared.clone(), listener));

        Ok(MockController {
            shared,
            local_addr,
            accept_task,
        })
    }

    /// Address the controller is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn server_config(&self) -> &ServerConfig {
        &self.shared.config
    }

    pub fn dispatcher(&self) -> &Dispatcher<D> {
        &self.shared.dispatcher
    }

    /// Whether a client is connected.
    pub fn is_connected(&self) -> bool {
        *self.shared.connected.borrow()
    }

    /// Wait until [`is_connected`](Self::is_connected) equals `connected`.
    pub async fn wait_connected(&self, connected: bool) {
        let mut rx = self.shared.connected.subscribe();
        // The sender lives as long as `self`, so this only returns once the value matches
        let _ = rx.wait_for(|value| *value == connected).await;
    }

    /// Run `f` with exclusive access to the controller state.
    ///
    /// Used to inspect state, inject faults or change commanding authority.
    /// Do not hold on to anything across an await; the publisher and the
    /// command loop wait for this lock.
    pub fn with_core<R>(&self, f: impl FnOnce(&mut ControllerCore<D>) -> R) -> R {
        let mut core = self.shared.core.lock();
        f(&mut *core)
    }

    /// Disconnect the current client, if any, and wait for its session to end.
    pub async fn close_client(&self) {
        let ending = {
            let mut slot = self.shared.session.lock();
            slot.as_mut().map(|session| {
                session.alive.send_replace(false);
                (session.id, session.task.take())
            })
        };
        let Some((id, task)) = ending else {
            return;
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(session = id, error = %e, "session task did not finish cleanly");
            }
        }
        self.shared.end_session(id);
    }

    /// Stop accepting connections and disconnect the current client.
    pub async fn close(&self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        self.accept_task.abort();
        self.close_client().await;
        info!(local_addr = %self.local_addr, "mock controller closed");
    }
}

impl<D: Device> Drop for MockController<D> {
    fn drop(&mut self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        self.accept_task.abort();
        if let Some(mut session) = self.shared.session.lock().take() {
            session.alive.send_replace(false);
            if let Some(task) = session.task.take() {
                task.abort();
            }
        }
    }
}

// ============================================================================
// Sessions
// ============================================================================

impl<D: Device> Shared<D> {
    /// Admit `stream` as the session client. If one is already connected the
    /// stream waits up to [`ADMIT_GRACE`] for that session to end and is
    /// closed if it does not.
    fn admit(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        if let Err(stream) = self.try_admit(stream, peer) {
            debug!(%peer, "slot taken, waiting for the current session to end");
            tokio::spawn(self.clone().admit_after_grace(stream, peer));
        }
    }

    async fn admit_after_grace(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let mut connected = self.connected.subscribe();
        // The borrow returned by `wait_for` is released at the end of this statement
        let _ = tokio::time::timeout(ADMIT_GRACE, connected.wait_for(|c| !*c)).await;
        if self.try_admit(stream, peer).is_err() && self.accepting.load(Ordering::SeqCst) {
            warn!(%peer, "rejecting connection: a client is already connected");
            metrics::counter!(metric_defs::CONNECTIONS_REJECTED.name, &self.labels.to_labels())
                .increment(1);
        }
    }

    /// Start a session for `stream` if the slot is free; hand the stream back otherwise.
    fn try_admit(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) -> Result<(), TcpStream> {
        let mut slot = self.session.lock();
        if slot.is_some() || !self.accepting.load(Ordering::SeqCst) {
            return Err(stream);
        }

        if self.config.reset_state_on_connect {
            self.core
                .lock()
                .state_mut()
                .set_state(self.config.initial_state);
        }

        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (alive, alive_rx) = watch::channel(true);
        self.connected.send_replace(true);
        let task = tokio::spawn(run_session(self.clone(), id, stream, peer, alive_rx));
        *slot = Some(Session {
            id,
            alive,
            task: Some(task),
        });
        Ok(())
    }

    /// Free the slot held by session `id` and report the disconnect.
    fn end_session(&self, id: u64) {
        let mut slot = self.session.lock();
        if slot.as_ref().is_some_and(|session| session.id == id) {
            *slot = None;
        }
        if slot.is_none() {
            self.connected.send_replace(false);
        }
    }

    /// Run one command and encode what must be written in reply, in order.
    fn dispatch(&self, command: &Command) -> (Option<Bytes>, Bytes) {
        let mut core = self.core.lock();
        let status = self.dispatcher.handle(&mut core, command);
        let config = if core.take_config_publish_request() {
            Some(core.config_frame())
        } else {
            None
        };
        (config, core.command_status_frame(command.counter, &status))
    }
}

async fn accept_loop<D: Device>(shared: Arc<Shared<D>>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => shared.admit(stream, peer),
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

async fn run_session<D: Device>(
    shared: Arc<Shared<D>>,
    id: u64,
    stream: TcpStream,
    peer: SocketAddr,
    alive: watch::Receiver<bool>,
) {
    info!(session = id, %peer, "client connected");
    let labels = shared.labels.to_labels();
    metrics::counter!(metric_defs::CONNECTIONS_ACCEPTED.name, &labels).increment(1);
    metrics::gauge!(metric_defs::CONNECTED.name, &labels).set(1.0);

    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "could not set TCP_NODELAY");
    }
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(AsyncMutex::new(writer));

    let publisher = tokio::spawn(publisher::run_publisher(
        shared.core.clone(),
        writer.clone(),
        shared.config.telemetry_interval,
        alive.clone(),
        shared.labels.clone(),
    ));

    let end = command_loop(&shared, &mut reader, &writer, alive).await;

    publisher.abort();
    // Wait for the abort to land so nothing is published once the slot is free
    let _ = publisher.await;
    if let Err(e) = writer.lock().await.shutdown().await {
        debug!(error = %e, "socket shutdown failed");
    }
    info!(session = id, %peer, reason = %end, "client disconnected");
    metrics::gauge!(metric_defs::CONNECTED.name, &labels).set(0.0);
    shared.end_session(id);
}

/// Read commands and write one status per command, in order, until the session ends.
async fn command_loop<D, R, W>(
    shared: &Shared<D>,
    reader: &mut R,
    writer: &AsyncMutex<W>,
    mut alive: watch::Receiver<bool>,
) -> SessionEnd
where
    D: Device,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let labels = shared.labels.to_labels();
    let mut buf = [0u8; Command::SIZE];
    loop {
        if !*alive.borrow() {
            return SessionEnd::Closed;
        }
        tokio::select! {
            changed = alive.changed() => {
                if changed.is_err() {
                    return SessionEnd::Closed;
                }
                continue;
            }
            read = reader.read_exact(&mut buf) => {
                if let Err(e) = read {
                    return match e.kind() {
                        io::ErrorKind::UnexpectedEof => SessionEnd::Eof,
                        _ => SessionEnd::ReadFailed(e),
                    };
                }
            }
        }

        let command: Command = match decode_record(&mut &buf[..]) {
            Ok(command) => command,
            Err(e) => return SessionEnd::Protocol(e),
        };
        let (config_frame, status_frame) = shared.dispatch(&command);

        if let Some(frame) = config_frame {
            if let Err(e) = write_frame(writer, &frame).await {
                return SessionEnd::WriteFailed(e);
            }
            metrics::counter!(metric_defs::CONFIG_PUBLISHED.name, &labels).increment(1);
        }
        if let Err(e) = write_frame(writer, &status_frame).await {
            return SessionEnd::WriteFailed(e);
        }
    }
}
