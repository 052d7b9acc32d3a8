//! Multiplexed async transport.
//!
//! One [`Transport`] owns one TCP connection and lets many calls be in
//! flight on it at once. [`Transport::send`] registers a pending entry keyed
//! by the request ID already embedded in the command's header, enqueues the
//! framed bytes, and returns a [`ResponseFuture`] immediately; the inbound
//! task resolves that future when the correlated response command arrives.
//! Completions are independent: there is no head-of-line blocking at the API
//! level even though the underlying stream is sequential.
//!
//! Each pending entry carries a deadline. A background sweep reclaims
//! expired entries and resolves their futures with a timeout error; a
//! response arriving after the reap is discarded and logged, never fatal.
//!
//! Lifecycle: `Connecting → Connected → Closing → Closed`. Sending outside
//! `Connected` fails immediately, and on connection loss every outstanding
//! entry resolves with a transport error so no caller hangs silently.

use std::future::Future;
use std::net::ToSocketAddrs;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};

use crate::protocol::command::{Command, Header, RequestId};
use crate::protocol::error::{Result, RpcError};

use super::codec::{decode_command, encode_command};
use super::frame::{read_frame, write_frame};

const STATE_CONNECTING: u8 = 0;
const STATE_CONNECTED: u8 = 1;
const STATE_CLOSING: u8 = 2;
const STATE_CLOSED: u8 = 3;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Closing,
    Closed,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            STATE_CONNECTING => ConnectionState::Connecting,
            STATE_CONNECTED => ConnectionState::Connected,
            STATE_CLOSING => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Transport tuning knobs.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Deadline for each outstanding request.
    pub request_timeout: Duration,
    /// How often the sweep task scans for expired pending entries.
    pub sweep_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            sweep_interval: Duration::from_millis(100),
        }
    }
}

/// Bookkeeping for one outstanding call: the result slot and its deadline.
/// Removed from the table exactly once — by response arrival, timeout sweep,
/// or connection teardown, whichever comes first.
struct Pending {
    tx: oneshot::Sender<Result<Command>>,
    deadline: Instant,
}

/// Handler for inbound request commands (the server dispatcher's entry
/// point). Returns the response command to write back, if any.
type InboundHandler =
    Arc<dyn Fn(Command) -> Pin<Box<dyn Future<Output = Option<Command>> + Send>> + Send + Sync>;

struct Shared {
    state: AtomicU8,
    pending: DashMap<RequestId, Pending>,
    outbound: mpsc::UnboundedSender<Bytes>,
    shutdown: watch::Sender<bool>,
    config: TransportConfig,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Moves the connection to `Closing`, fails every outstanding entry, and
    /// settles in `Closed`. Idempotent: the first caller wins, later callers
    /// return immediately.
    fn begin_close(&self, reason: &str) {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            if current >= STATE_CLOSING {
                return;
            }
            match self.state.compare_exchange(
                current,
                STATE_CLOSING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        let _ = self.shutdown.send(true);
        self.fail_all_pending(reason);
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
    }

    fn fail_all_pending(&self, reason: &str) {
        let ids: Vec<RequestId> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                let _ = pending
                    .tx
                    .send(Err(RpcError::Transport(reason.to_string())));
            }
        }
    }

    /// Resolves the pending entry matching this response command. A late,
    /// duplicate, or unknown response is discarded and logged.
    fn resolve(&self, command: Command) {
        let request_id = command.request_id();
        match self.pending.remove(&request_id) {
            Some((_, pending)) => {
                // The caller may have abandoned the future; that only
                // affects this one call.
                let _ = pending.tx.send(Ok(command));
            }
            None => {
                tracing::debug!(request_id, "discarding response with no pending request");
            }
        }
    }
}

/// One multiplexed connection. Cheap to clone; all clones share the same
/// pending table and I/O tasks.
#[derive(Clone)]
pub struct Transport {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

impl Transport {
    /// Connects to a remote endpoint with default configuration.
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with(addr, TransportConfig::default()).await
    }

    /// Connects to a remote endpoint.
    ///
    /// The address may resolve to several candidates; each is tried until
    /// one accepts.
    pub async fn connect_with(addr: &str, config: TransportConfig) -> Result<Self> {
        let socket_addrs = addr
            .to_socket_addrs()
            .map_err(|e| RpcError::Transport(format!("invalid address '{addr}': {e}")))?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match TcpStream::connect(&socket_addr).await {
                Ok(stream) => return Ok(Self::start(stream, config)),
                Err(e) => last_err = Some(e),
            }
        }

        Err(RpcError::Transport(format!(
            "failed to connect to {addr}: {}",
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no addresses resolved".to_string())
        )))
    }

    /// Runs a transport over an established stream. Inbound request commands
    /// have no handler here and are discarded with a warning; use
    /// [`with_handler`](Self::with_handler) on the serving side.
    pub fn start(stream: TcpStream, config: TransportConfig) -> Self {
        Self::spawn(stream, config, None)
    }

    /// Runs a transport over an established stream, handing inbound request
    /// commands to `handler`. Each request is handled on its own task, so
    /// independent requests on this connection dispatch concurrently.
    pub fn with_handler<F, Fut>(stream: TcpStream, config: TransportConfig, handler: F) -> Self
    where
        F: Fn(Command) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Command>> + Send + 'static,
    {
        let handler: InboundHandler = Arc::new(move |command| Box::pin(handler(command)));
        Self::spawn(stream, config, Some(handler))
    }

    fn spawn(stream: TcpStream, config: TransportConfig, handler: Option<InboundHandler>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            state: AtomicU8::new(STATE_CONNECTING),
            pending: DashMap::new(),
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            config,
        });

        let (reader, writer) = stream.into_split();
        tokio::spawn(writer_task(
            shared.clone(),
            writer,
            outbound_rx,
            shared.shutdown.subscribe(),
        ));
        tokio::spawn(reader_task(
            shared.clone(),
            reader,
            handler,
            shared.shutdown.subscribe(),
        ));
        tokio::spawn(sweep_task(shared.clone(), shared.shutdown.subscribe()));

        shared.state.store(STATE_CONNECTED, Ordering::SeqCst);
        Transport { shared }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    /// Sends a request command and returns a future for its response.
    ///
    /// The request ID is taken from the command's header — this layer
    /// generates none itself. The future resolves when the correlated
    /// response arrives, the deadline elapses, or the connection fails,
    /// whichever happens first.
    ///
    /// # Errors
    ///
    /// Fails immediately with [`RpcError::Transport`] unless the connection
    /// is in the `Connected` state.
    pub fn send(&self, command: Command) -> Result<ResponseFuture> {
        let state = self.shared.state();
        if state != ConnectionState::Connected {
            return Err(RpcError::Transport(format!(
                "cannot send: connection is {state:?}"
            )));
        }

        let request_id = command.request_id();
        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(
            request_id,
            Pending {
                tx,
                deadline: Instant::now() + self.shared.config.request_timeout,
            },
        );

        let bytes = encode_command(&command);
        if self.shared.outbound.send(bytes).is_err() {
            self.shared.pending.remove(&request_id);
            return Err(RpcError::Transport("connection closed".to_string()));
        }

        // The connection may have failed between the state check and the
        // insert; entries added after the teardown drain must not hang.
        if self.shared.state() != ConnectionState::Connected {
            if self.shared.pending.remove(&request_id).is_some() {
                return Err(RpcError::Transport("connection closed".to_string()));
            }
        }

        Ok(ResponseFuture { rx })
    }

    /// Enqueues a response command for writing, without registering any
    /// pending entry. Used by the dispatcher's reply path.
    pub fn send_response(&self, command: Command) -> Result<()> {
        let state = self.shared.state();
        if state != ConnectionState::Connected {
            return Err(RpcError::Transport(format!(
                "cannot send: connection is {state:?}"
            )));
        }
        self.shared
            .outbound
            .send(encode_command(&command))
            .map_err(|_| RpcError::Transport("connection closed".to_string()))
    }

    /// Closes the connection. Outstanding requests fail with a transport
    /// error. Idempotent.
    pub fn close(&self) {
        self.shared.begin_close("connection closed locally");
    }
}

async fn writer_task(
    shared: Arc<Shared>,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            frame = outbound.recv() => match frame {
                Some(bytes) => {
                    if let Err(e) = write_frame(&mut writer, &bytes).await {
                        tracing::warn!(error = %e, "write failed; closing connection");
                        shared.begin_close(&format!("connection lost: {e}"));
                        break;
                    }
                }
                None => break,
            },
        }
    }
    let _ = writer.shutdown().await;
}

async fn reader_task(
    shared: Arc<Shared>,
    mut reader: OwnedReadHalf,
    handler: Option<InboundHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            frame = read_frame(&mut reader) => frame,
        };

        let bytes = match frame {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!("connection closed by peer");
                shared.begin_close("connection closed by peer");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "read failed; closing connection");
                shared.begin_close(&format!("connection lost: {e}"));
                break;
            }
        };

        let command = match decode_command(&bytes) {
            Ok(command) => command,
            Err(e) => {
                // A malformed frame is fatal to this connection only.
                tracing::warn!(error = %e, "undecodable inbound frame; closing connection");
                shared.begin_close(&format!("protocol error: {e}"));
                break;
            }
        };

        match &command.header {
            Header::Response(_) => shared.resolve(command),
            Header::Request(_) => match &handler {
                Some(handler) => {
                    let handler = handler.clone();
                    let shared = shared.clone();
                    tokio::spawn(async move {
                        if let Some(response) = handler(command).await {
                            let _ = shared.outbound.send(encode_command(&response));
                        }
                    });
                }
                None => {
                    tracing::warn!(
                        request_id = command.request_id(),
                        "discarding request command on a client connection"
                    );
                }
            },
        }
    }
}

async fn sweep_task(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(shared.config.sweep_interval);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {}
        }

        let now = Instant::now();
        // Collect first: removing while holding the iterator would deadlock
        // on the shard locks.
        let expired: Vec<RequestId> = shared
            .pending
            .iter()
            .filter(|entry| entry.value().deadline <= now)
            .map(|entry| *entry.key())
            .collect();

        for request_id in expired {
            if let Some((_, pending)) = shared.pending.remove(&request_id) {
                tracing::debug!(request_id, "request timed out; reclaiming pending entry");
                let _ = pending
                    .tx
                    .send(Err(RpcError::Timeout(shared.config.request_timeout)));
            }
        }
    }
}

/// Future for one in-flight request. Dropping it abandons the call without
/// affecting other in-flight requests.
pub struct ResponseFuture {
    rx: oneshot::Receiver<Result<Command>>,
}

impl std::fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFuture").finish_non_exhaustive()
    }
}

impl Future for ResponseFuture {
    type Output = Result<Command>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(RpcError::Transport(
                "connection closed before response".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}
