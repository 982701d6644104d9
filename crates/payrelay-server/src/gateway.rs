//! Real-time gateway: owns WebSocket lifecycles and is the only
//! component that creates or destroys registry entries.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use payrelay_delivery::{Connection, ConnectionRegistry};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::server::AppState;

/// RFC 6455 policy-violation close code.
const POLICY_VIOLATION: u16 = 1008;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(rename = "clientId")]
    pub client_id: Option<String>,
}

/// The order identifier the peer wants to listen on, if usable.
fn validate_client_key(raw: Option<String>) -> Option<String> {
    raw.filter(|key| !key.is_empty())
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, query.client_id, state))
}

/// Handle a new WebSocket connection end to end.
async fn handle_socket(mut socket: WebSocket, client_key: Option<String>, state: AppState) {
    let Some(key) = validate_client_key(client_key) else {
        // Terminal for this attempt: no registry mutation happened.
        let _ = socket
            .send(WsMessage::Close(Some(CloseFrame {
                code: POLICY_VIOLATION,
                reason: "clientId required".into(),
            })))
            .await;
        return;
    };

    let (conn, rx) = Connection::channel(state.config.max_send_queue);
    state.registry.register(&key, Arc::clone(&conn));
    tracing::info!(client_key = %key, connection_id = %conn.id(), "websocket connected");

    run_connection(socket, rx, &conn, state.config.heartbeat_interval).await;

    // Close and error funnel into this single spot; unregister is
    // idempotent, so a racing sweep is harmless.
    conn.mark_closed();
    state.registry.unregister(&key, conn.id());
    tracing::info!(client_key = %key, connection_id = %conn.id(), "websocket disconnected");
}

/// Pump the socket until the peer goes away: writer task forwards the
/// connection's queue and heartbeats, reader task tracks pongs and
/// detects close or transport errors.
async fn run_connection(
    socket: WebSocket,
    mut rx: mpsc::Receiver<String>,
    conn: &Arc<Connection>,
    heartbeat_interval: Duration,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_conn = Arc::clone(conn);
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat_interval);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                frame = rx.recv() => {
                    match frame {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }

        writer_conn.mark_closed();
    });

    let reader_conn = Arc::clone(conn);
    let reader = tokio::spawn(async move {
        // An Err from the stream is a transport error and ends the
        // connection the same way a close frame does.
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Pong(_) => reader_conn.record_pong(),
                WsMessage::Close(_) => break,
                WsMessage::Ping(_) => {} // axum answers pongs automatically
                _ => {}
            }
        }
    });

    // Whichever half finishes first wins; the connection is done.
    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }
}

/// Periodically drop peers that stopped answering pings.
pub fn start_sweep_task(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    client_timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = registry.sweep_dead(client_timeout);
            if removed > 0 {
                tracing::info!(removed, "dead connection sweep");
            }
        }
    })
}
