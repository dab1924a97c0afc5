//! WebSocket transport
//!
//! Responsibilities:
//! - accept TCP connections on one endpoint and complete the WebSocket
//!   handshake (`Connecting`)
//! - register a [`Connection`] with the engine (`Open`); registration may be
//!   refused when the proxy is full or draining
//! - read binary messages and hand them to the engine in receipt order
//! - write the connection's outbound queue to the socket
//! - on peer close, transport failure or a drain request, release the
//!   connection and give queued output `drain_grace` to flush (`Closed`)

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::SharedEngine;
use crate::connection::{Connection, ConnectionId, ConnectionState, Role};
use crate::utils::error::ProxyError;

type WsSender = SplitSink<WebSocketStream<TcpStream>, WsMessage>;
type WsReceiver = SplitStream<WebSocketStream<TcpStream>>;

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// What a connection task needs to know about the endpoint that accepted it.
#[derive(Debug, Clone)]
pub struct EndpointContext {
    pub engine: SharedEngine,
    pub role: Role,
    pub queue_capacity: usize,
    pub drain_grace: Duration,
}

/// Accept connections until `shutdown` flips to `true` (or its sender is
/// dropped). Returns the set of still-running connection tasks so the caller
/// can wait for them to drain.
pub async fn run_endpoint(
    listener: TcpListener,
    ctx: EndpointContext,
    mut shutdown: watch::Receiver<bool>,
) -> JoinSet<()> {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            // The watch::Ref from wait_for is not Send, so it must not
            // outlive this arm.
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(serve_connection(stream, peer, ctx.clone()));
                }
                Err(e) => {
                    warn!(role = %ctx.role, "accept failed: {e}");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished {
                    if e.is_panic() {
                        warn!(role = %ctx.role, "connection task panicked: {e}");
                    }
                }
            }
        }
    }

    info!(role = %ctx.role, open = connections.len(), "endpoint stopped accepting");
    connections
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, ctx: EndpointContext) {
    let mut ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, role = %ctx.role, "WebSocket handshake error: {e}");
            return;
        }
    };

    let (tx, rx) = mpsc::channel::<Bytes>(ctx.queue_capacity.max(1));
    let connection = Connection::new(ctx.role, peer, tx);
    let liveness = connection.liveness();

    let registered = ctx.engine.lock().register(connection);
    let id = match registered {
        Ok(id) => id,
        Err(e) => {
            warn!(%peer, role = %ctx.role, "rejecting connection: {e}");
            liveness.advance(ConnectionState::Closed);
            let _ = ws_stream.close(None).await;
            return;
        }
    };
    info!(%id, %peer, role = %ctx.role, "connection open");

    let (ws_sender, ws_receiver) = ws_stream.split();
    let writer = write_loop(id, ws_sender, rx);
    tokio::pin!(writer);

    let writer_finished = tokio::select! {
        _ = read_loop(id, ws_receiver, &ctx.engine, liveness.subscribe()) => false,
        _ = &mut writer => true,
    };

    // No-op when the engine already removed it (eviction, proxy drain).
    // Dropping the record closes the queue, so the writer ends once it has
    // flushed what is left.
    ctx.engine.lock().remove_connection(&id);

    if !writer_finished && tokio::time::timeout(ctx.drain_grace, &mut writer).await.is_err() {
        warn!(%id, "drain grace expired with frames still queued");
    }

    liveness.advance(ConnectionState::Closed);
    info!(%id, "connection closed");
}

async fn read_loop(
    id: ConnectionId,
    mut ws_receiver: WsReceiver,
    engine: &SharedEngine,
    mut liveness: watch::Receiver<ConnectionState>,
) {
    loop {
        tokio::select! {
            changed = liveness.changed() => {
                if changed.is_err() || *liveness.borrow() != ConnectionState::Open {
                    debug!(%id, "told to drain, no longer reading");
                    return;
                }
            }
            msg = ws_receiver.next() => match msg {
                Some(Ok(WsMessage::Binary(data))) => {
                    let outcome = engine.lock().handle_frame(&id, data);
                    if let Err(e) = outcome {
                        warn!(%id, "dropping frame: {e}");
                    }
                }
                Some(Ok(WsMessage::Text(text))) => {
                    warn!(%id, len = text.len(), "dropping text message, frames must be binary");
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    debug!(%id, "peer closed");
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(source)) => {
                    debug!("{}", ProxyError::Transport { id, source });
                    return;
                }
            }
        }
    }
}

async fn write_loop(id: ConnectionId, mut ws_sender: WsSender, mut rx: mpsc::Receiver<Bytes>) {
    while let Some(frame) = rx.recv().await {
        // batch whatever is already queued into one flush
        let written = if rx.is_empty() {
            ws_sender.send(WsMessage::Binary(frame)).await
        } else {
            ws_sender.feed(WsMessage::Binary(frame)).await
        };
        if let Err(source) = written {
            debug!("{}", ProxyError::Transport { id, source });
            return;
        }
    }

    let _ = ws_sender.close().await;
}
