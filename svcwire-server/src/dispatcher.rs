//! Per-connection frame dispatch.
//!
//! Each accepted socket gets one dispatch loop: decode frames, resolve
//! their routing header, invoke the operation on its own task, and funnel
//! replies back through a single writer. Invocations pipeline freely;
//! completion order is unconstrained because replies carry the request's
//! message id.

use crate::error::ServerError;
use crate::router::Router;
use crate::server::ServerConfig;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use svcwire_protocol::{error_body, Decoder, Frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

/// Capacity of the per-connection reply channel.
const REPLY_CHANNEL_CAPACITY: usize = 256;

/// Read buffer size for socket reads (8 KiB).
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Drives one inbound connection until it closes, errors, idles out or
/// the server shuts down.
///
/// Failure semantics: a malformed frame is connection-fatal (the byte
/// stream cannot be resynchronized); routing and invocation failures are
/// per-request and produce error-marked replies.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    router: Arc<dyn Router>,
    config: ServerConfig,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    let session_id = Uuid::new_v4();
    tracing::info!(%addr, %session_id, "client connected");

    let (mut read_half, mut write_half) = stream.into_split();
    let mut decoder = Decoder::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut last_activity = Instant::now();

    let (reply_tx, mut reply_rx) = mpsc::channel::<Bytes>(REPLY_CHANNEL_CAPACITY);

    loop {
        tokio::select! {
            biased;

            // Completed invocations, in whatever order they finish.
            Some(encoded) = reply_rx.recv() => {
                write_half.write_all(&encoded).await?;
            }

            result = read_half.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        tracing::debug!(%addr, %session_id, "connection closed by client");
                        return Ok(());
                    }
                    Ok(n) => {
                        last_activity = Instant::now();
                        decoder.extend(&buf[..n]);
                    }
                    Err(e) => {
                        tracing::debug!(%addr, %session_id, error = %e, "read error");
                        return Err(ServerError::Io(e));
                    }
                }

                // Malformed frames propagate out and close the connection.
                while let Some(frame) = decoder.decode_frame()? {
                    dispatch(frame, &router, &reply_tx, session_id);
                }
            }

            _ = tokio::time::sleep(config.idle_timeout) => {
                if last_activity.elapsed() >= config.idle_timeout {
                    tracing::debug!(%addr, %session_id, "idle timeout");
                    return Ok(());
                }
            }

            _ = shutdown.recv() => {
                tracing::debug!(%addr, %session_id, "shutdown signal received");
                return Err(ServerError::ShuttingDown);
            }
        }
    }
}

/// Resolves and invokes one frame. The invocation runs on its own task so
/// slow operations never stall the read loop or other requests on the
/// same connection.
fn dispatch(
    frame: Frame,
    router: &Arc<dyn Router>,
    reply_tx: &mpsc::Sender<Bytes>,
    session_id: Uuid,
) {
    let msg_id = frame.msg_id;

    let op = match router.resolve(&frame.header) {
        Ok(op) => op,
        Err(e) => {
            tracing::debug!(%session_id, msg_id, error = %e, "unroutable frame");
            let reply_tx = reply_tx.clone();
            let body = error_body(&e.to_string());
            tokio::spawn(async move {
                send_reply(reply_tx, msg_id, body).await;
            });
            return;
        }
    };

    let reply_tx = reply_tx.clone();
    tokio::spawn(async move {
        let body = match op.invoke(frame.body).await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(%session_id, msg_id, error = %e, "operation failed");
                error_body(&e.to_string())
            }
        };
        send_reply(reply_tx, msg_id, body).await;
    });
}

/// Encodes a reply echoing the request's message id and hands it to the
/// connection writer.
async fn send_reply(reply_tx: mpsc::Sender<Bytes>, msg_id: u64, body: Bytes) {
    let frame = Frame::new(msg_id, Bytes::new(), body);
    match frame.encode() {
        Ok(encoded) => {
            // A closed channel means the connection is already gone.
            let _ = reply_tx.send(encoded.freeze()).await;
        }
        Err(e) => {
            tracing::warn!(msg_id, error = %e, "failed to encode reply");
        }
    }
}
