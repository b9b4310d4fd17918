//! Per-connection WebSocket lifecycle: writer task with heartbeat, reader
//! loop routing frames into the relay, and disconnect on the way out.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use relay_core::{ServerEvent, SessionId};
use relay_engine::{RelayHandle, SessionSink};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::connection::{Connection, ConnectionHub};
use crate::protocol::ClientMessage;

/// Upper bound on how long a closing writer may spend flushing.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Run one WebSocket connection to completion.
pub async fn handle_ws_connection(
    socket: WebSocket,
    relay: RelayHandle,
    hub: Arc<ConnectionHub>,
    connection: Arc<Connection>,
    rx: mpsc::Receiver<Arc<String>>,
    heartbeat: Duration,
) {
    let sink: Arc<dyn SessionSink> = Arc::clone(&connection) as Arc<dyn SessionSink>;
    let session_id = match relay.connect(sink).await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "rejecting connection, relay unavailable");
            let mut socket = socket;
            let _ = socket.send(WsMessage::Close(None)).await;
            return;
        }
    };
    hub.insert(session_id.clone(), Arc::clone(&connection));

    let (ws_tx, mut ws_rx) = socket.split();
    let writer = tokio::spawn(run_writer(
        ws_tx,
        rx,
        Arc::clone(&connection),
        session_id.clone(),
        heartbeat,
    ));

    let closed = connection.closed().clone();
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            msg = ws_rx.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    if !route_frame(&relay, &connection, &session_id, text.as_str()).await {
                        break;
                    }
                }
                Some(Ok(WsMessage::Pong(_))) => connection.record_pong(),
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(%session_id, error = %e, "websocket read error");
                    break;
                }
            }
        }
    }

    connection.close();
    let _ = relay.disconnect(session_id.clone()).await;
    hub.remove(&session_id);
    let _ = writer.await;
    info!(%session_id, "connection closed");
}

/// Hand one inbound frame to the relay. Returns `false` once the relay is gone.
async fn route_frame(
    relay: &RelayHandle,
    connection: &Connection,
    session_id: &SessionId,
    text: &str,
) -> bool {
    trace!(%session_id, len = text.len(), "frame received");
    let message = match ClientMessage::parse(text) {
        Ok(m) => m,
        Err(e) => {
            debug!(%session_id, error = %e, "unreadable frame");
            let notice = ServerEvent::InvalidCommand {
                message: e.to_string(),
            };
            if let Ok(json) = serde_json::to_string(&notice) {
                connection.send(Arc::new(json));
            }
            return true;
        }
    };

    let sid = session_id.clone();
    let result = match message {
        ClientMessage::RegisterExecutor => relay.register_executor(sid).await,
        ClientMessage::Command(request) => relay.submit(sid, request).await,
        ClientMessage::CommandCompleted(report) => relay.report_completion(sid, report).await,
        ClientMessage::Ping => relay.ping(sid).await,
    };
    result.is_ok()
}

/// Forward queued frames to the socket and ping on the heartbeat interval.
/// When the connection is closed, whatever is already queued is flushed
/// before the Close frame.
async fn run_writer(
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<Arc<String>>,
    connection: Arc<Connection>,
    session_id: SessionId,
    heartbeat: Duration,
) {
    let closed = connection.closed().clone();
    let mut ping_interval = tokio::time::interval(heartbeat);
    ping_interval.tick().await; // consume first immediate tick

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(frame) => {
                    if ws_tx.send(WsMessage::Text(frame.as_str().into())).await.is_err() {
                        connection.close();
                        return;
                    }
                }
                None => break,
            },
            _ = ping_interval.tick() => {
                if ws_tx.send(WsMessage::Ping(Bytes::new())).await.is_err() {
                    connection.close();
                    return;
                }
                trace!(%session_id, "sent ping");
            }
            _ = closed.cancelled() => break,
        }
    }

    let flush = async {
        while let Ok(frame) = rx.try_recv() {
            if ws_tx.send(WsMessage::Text(frame.as_str().into())).await.is_err() {
                return;
            }
        }
        let _ = ws_tx.send(WsMessage::Close(None)).await;
    };
    if tokio::time::timeout(FLUSH_TIMEOUT, flush).await.is_err() {
        warn!(%session_id, "timed out flushing connection");
    }
}
