//! Client connection state machine.
//!
//! A `ClientConnection` owns at most one socket to its endpoint and
//! multiplexes every caller's requests over it, correlating replies by
//! message id. All state transitions and mutations of the outbound
//! backlog funnel through a single per-connection mutex; socket I/O runs
//! on dedicated tasks that report back through the same critical section.
//!
//! Lifecycle: `Disconnected` until the first submit, then `Connecting`,
//! then either `TryLogin` (endpoint advertises login and credentials are
//! configured) or straight to `Working`. Any socket failure tears the
//! connection down to `Disconnected`, failing every pending request; the
//! next submit transparently reconnects.

use crate::config::ClientConfig;
use crate::endpoint::Endpoint;
use crate::error::ClientError;
use crate::pending::{PendingTable, ReplySender};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Instant;
use svcwire_protocol::{next_msg_id, Decoder, Frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

/// Read buffer size for socket reads (8 KiB).
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// No socket; the next submit triggers a connect.
    Disconnected,
    /// Connect in flight; submits are buffered.
    Connecting,
    /// Socket up, login handshake in flight; submits are buffered.
    TryLogin,
    /// Socket up and authenticated (if applicable); submits go out directly.
    Working,
}

/// State guarded by the per-connection critical section.
struct Shared {
    state: ConnState,
    /// Encoded frames accumulated while the socket is not yet writable.
    /// Flushed FIFO when the connection reaches `Working`.
    backlog: Vec<Bytes>,
    /// Writer channel for the live socket; present in `TryLogin`/`Working`.
    writer: Option<mpsc::UnboundedSender<Bytes>>,
    /// Bumped on every teardown so stale I/O tasks from a previous socket
    /// cannot tear down a newer one.
    generation: u64,
}

/// One multiplexed connection to a remote endpoint.
pub struct ClientConnection {
    endpoint: Endpoint,
    config: ClientConfig,
    shared: Mutex<Shared>,
    pending: PendingTable,
    weak: Weak<Self>,
}

impl ClientConnection {
    /// Creates a connection in the `Disconnected` state. No socket is
    /// opened until the first submit.
    pub fn new(endpoint: Endpoint, config: ClientConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            endpoint,
            config,
            shared: Mutex::new(Shared {
                state: ConnState::Disconnected,
                backlog: Vec::new(),
                writer: None,
                generation: 0,
            }),
            pending: PendingTable::new(),
            weak: weak.clone(),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ConnState {
        self.shared.lock().state
    }

    /// Number of requests currently awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Registers a request and hands its frame to the transport.
    ///
    /// Never blocks. The reply, or the failure that terminated the
    /// request, arrives on the returned channel exactly once.
    pub fn submit(&self, header: Bytes, body: Bytes) -> oneshot::Receiver<Result<Frame, ClientError>> {
        let (tx, rx) = oneshot::channel();
        self.submit_with(header, body, tx);
        rx
    }

    /// Sends a request and awaits its reply.
    pub async fn request(&self, header: Bytes, body: Bytes) -> Result<Frame, ClientError> {
        match self.submit(header, body).await {
            Ok(result) => result,
            // The sender can only disappear uncompleted if the connection
            // itself was dropped.
            Err(_) => Err(ClientError::ConnectionClosed),
        }
    }

    pub(crate) fn submit_with(&self, header: Bytes, body: Bytes, tx: ReplySender) {
        let msg_id = next_msg_id();
        let frame = Frame::new(msg_id, header, body);
        let encoded = match frame.encode() {
            Ok(buf) => buf.freeze(),
            Err(e) => {
                let _ = tx.send(Err(e.into()));
                return;
            }
        };

        // Register before any write so a reply racing ahead of our own
        // bookkeeping can never miss its entry.
        let deadline = Instant::now() + self.config.request_timeout;
        self.pending.insert(msg_id, deadline, tx);

        let mut shared = self.shared.lock();
        match shared.state {
            ConnState::Working => {
                let delivered = shared
                    .writer
                    .as_ref()
                    .map(|w| w.send(encoded).is_ok())
                    .unwrap_or(false);
                if !delivered {
                    // Writer task already gone; the in-flight teardown
                    // will fail this entry along with the rest.
                    tracing::debug!(
                        endpoint = %self.endpoint,
                        msg_id,
                        "writer unavailable, request will fail on teardown"
                    );
                }
            }
            ConnState::Connecting | ConnState::TryLogin => {
                shared.backlog.push(encoded);
            }
            ConnState::Disconnected => {
                shared.backlog.push(encoded);
                shared.state = ConnState::Connecting;
                let generation = shared.generation;
                if let Some(this) = self.weak.upgrade() {
                    tokio::spawn(async move {
                        this.run_connect(generation).await;
                    });
                }
            }
        }
    }

    /// Fails every expired pending request with a timeout error.
    /// Called by the pool's sweeper; per-request, connection state is
    /// untouched.
    pub(crate) fn sweep(&self, now: Instant) -> usize {
        let mut failed = 0;
        for msg_id in self.pending.expired(now) {
            if let Some(pending) = self.pending.remove(msg_id) {
                let _ = pending.tx.send(Err(ClientError::Timeout));
                failed += 1;
            }
        }
        failed
    }

    async fn run_connect(self: Arc<Self>, generation: u64) {
        tracing::debug!(endpoint = %self.endpoint, "connecting");

        let connect = TcpStream::connect(self.endpoint.authority());
        let stream = match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::debug!(endpoint = %self.endpoint, error = %e, "connect failed");
                self.teardown(generation, || {
                    ClientError::ConnectFailed(self.endpoint.raw().to_string(), e.to_string())
                });
                return;
            }
            Err(_) => {
                tracing::debug!(endpoint = %self.endpoint, "connect timed out");
                self.teardown(generation, || {
                    ClientError::ConnectFailed(
                        self.endpoint.raw().to_string(),
                        "connect timed out".to_string(),
                    )
                });
                return;
            }
        };
        stream.set_nodelay(true).ok();

        let login = if self.endpoint.login_supported() {
            if self.config.login.is_none() {
                tracing::info!(
                    endpoint = %self.endpoint,
                    "endpoint advertises login but no credentials configured, skipping handshake"
                );
            }
            self.config.login.clone()
        } else {
            None
        };

        let (read_half, write_half) = stream.into_split();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();

        {
            let mut shared = self.shared.lock();
            if shared.generation != generation || shared.state != ConnState::Connecting {
                // Torn down while the connect was in flight.
                return;
            }
            shared.writer = Some(writer_tx.clone());
            // Without a handshake the state stays Connecting here;
            // enter_working flushes the backlog and transitions to
            // Working in one critical section, so a concurrent submit
            // can never put its frame on the wire ahead of buffered ones.
            if login.is_some() {
                shared.state = ConnState::TryLogin;
            }
        }

        tokio::spawn(write_loop(write_half, writer_rx));
        let reader = self.clone();
        tokio::spawn(async move {
            reader.read_loop(read_half, generation).await;
        });

        match login {
            Some(login) => self.run_login(generation, writer_tx, login).await,
            None => self.enter_working(generation),
        }
    }

    /// Drives the login handshake: the login frame is the first frame on
    /// the fresh socket, its reply is intercepted here and never surfaced
    /// to callers. User frames keep accumulating in the backlog until the
    /// handshake settles.
    async fn run_login(
        &self,
        generation: u64,
        writer: mpsc::UnboundedSender<Bytes>,
        login: crate::config::LoginConfig,
    ) {
        let msg_id = next_msg_id();
        let frame = Frame::new(msg_id, login.header.clone(), login.body.clone());
        let encoded = match frame.encode() {
            Ok(buf) => buf.freeze(),
            Err(e) => {
                self.teardown(generation, || {
                    ClientError::LoginFailed(self.endpoint.raw().to_string(), e.to_string())
                });
                return;
            }
        };

        let (tx, rx) = oneshot::channel();
        let deadline = Instant::now() + self.config.request_timeout;
        self.pending.insert(msg_id, deadline, tx);
        if writer.send(encoded).is_err() {
            self.teardown(generation, || {
                ClientError::LoginFailed(
                    self.endpoint.raw().to_string(),
                    "connection lost during handshake".to_string(),
                )
            });
            return;
        }

        let reason = match rx.await {
            Ok(Ok(reply)) if (login.verify)(&reply) => {
                tracing::debug!(endpoint = %self.endpoint, "login accepted");
                self.enter_working(generation);
                return;
            }
            Ok(Ok(_)) => "credentials rejected".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(_) => "handshake interrupted".to_string(),
        };
        tracing::warn!(endpoint = %self.endpoint, %reason, "login failed");
        self.teardown(generation, || {
            ClientError::LoginFailed(self.endpoint.raw().to_string(), reason.clone())
        });
    }

    /// Transition to `Working`, flushing the backlog in send order. The
    /// flush happens under the critical section: pushes to the writer
    /// channel never block, and holding the lock keeps concurrent submits
    /// from jumping ahead of buffered frames.
    fn enter_working(&self, generation: u64) {
        let mut shared = self.shared.lock();
        if shared.generation != generation {
            return;
        }
        if let Some(writer) = shared.writer.clone() {
            for encoded in shared.backlog.drain(..) {
                if writer.send(encoded).is_err() {
                    break;
                }
            }
        }
        shared.state = ConnState::Working;
    }

    async fn read_loop(self: Arc<Self>, mut reader: OwnedReadHalf, generation: u64) {
        let mut decoder = Decoder::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => {
                    tracing::debug!(endpoint = %self.endpoint, "connection closed by remote");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(endpoint = %self.endpoint, error = %e, "read error");
                    break;
                }
            };
            decoder.extend(&buf[..n]);

            loop {
                match decoder.decode_frame() {
                    Ok(Some(frame)) => self.complete(frame),
                    Ok(None) => break,
                    Err(e) => {
                        // A misaligned stream cannot be resynchronized.
                        tracing::warn!(
                            endpoint = %self.endpoint,
                            error = %e,
                            "malformed frame, closing connection"
                        );
                        self.teardown(generation, || ClientError::ConnectionClosed);
                        return;
                    }
                }
            }
        }

        self.teardown(generation, || ClientError::ConnectionClosed);
    }

    /// Delivers a reply to its pending request. Whichever of reply,
    /// sweeper or teardown removes the entry first wins; here a missing
    /// entry means the request already timed out or was drained.
    fn complete(&self, frame: Frame) {
        match self.pending.remove(frame.msg_id) {
            Some(pending) => {
                let _ = pending.tx.send(Ok(frame));
            }
            None => {
                tracing::debug!(msg_id = frame.msg_id, "reply without pending request, dropping");
            }
        }
    }

    /// Resets to `Disconnected` and fails everything in flight.
    ///
    /// The pending table is swapped for a fresh one inside `drain`, so
    /// requests submitted concurrently with the teardown land in the new
    /// table and are not double-processed; the detached entries are
    /// completed outside any lock.
    fn teardown(&self, generation: u64, err: impl Fn() -> ClientError) {
        {
            let mut shared = self.shared.lock();
            if shared.generation != generation {
                return;
            }
            shared.generation += 1;
            shared.state = ConnState::Disconnected;
            // Dropping the sender ends the write loop, which shuts the
            // socket down on its way out.
            shared.writer = None;
            shared.backlog.clear();
        }

        let drained = self.pending.drain();
        if !drained.is_empty() {
            tracing::debug!(
                endpoint = %self.endpoint,
                count = drained.len(),
                "failing pending requests after teardown"
            );
        }
        for pending in drained {
            let _ = pending.tx.send(Err(err()));
        }
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Bytes>) {
    while let Some(encoded) = rx.recv().await {
        if let Err(e) = writer.write_all(&encoded).await {
            tracing::debug!(error = %e, "socket write failed");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
