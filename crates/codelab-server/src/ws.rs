//! Socket tasks for the presence and sync channels.
//!
//! Each accepted socket is split into a writer task (drains the send
//! queue, emits pings) and an inline reader loop. A per-connection child
//! of the server shutdown token ties the tasks together: a heartbeat
//! timeout, a transport error, or server shutdown cancels all of them.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::{ClientConnection, next_connection_id};
use crate::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::presence::PresenceBroadcaster;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::relay::{SyncFrame, SyncRelay, next_peer_id};

/// Drive one presence-channel connection to completion.
pub async fn serve_presence_socket(
    socket: WebSocket,
    presence: Arc<PresenceBroadcaster>,
    config: ServerConfig,
    shutdown: CancellationToken,
) {
    let connection_id = next_connection_id();
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(config.send_queue);
    let conn = Arc::new(ClientConnection::new(connection_id.clone(), tx));
    presence.registry().register(Arc::clone(&conn));
    info!(connection_id, "presence client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let cancel = shutdown.child_token();

    let ping_every = Duration::from_secs(config.heartbeat_interval_secs);
    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_every);
        let _ = ping.tick().await; // first tick fires immediately
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = writer_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let hb_conn = Arc::clone(&conn);
    let hb_cancel = cancel.clone();
    let watchdog_cancel = cancel.clone();
    let hb_timeout = Duration::from_secs(config.heartbeat_timeout_secs);
    let watchdog = tokio::spawn(async move {
        let result = run_heartbeat(hb_conn, ping_every, hb_timeout, hb_cancel).await;
        if result == HeartbeatResult::TimedOut {
            warn!("presence client stopped responding, closing");
            watchdog_cancel.cancel();
        }
    });

    loop {
        tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    handle_presence_text(&presence, &conn, text.as_str());
                }
                Some(Ok(Message::Pong(_))) => conn.mark_alive(),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(connection_id = %conn.id, error = %e, "presence socket error");
                    break;
                }
            },
            () = cancel.cancelled() => break,
        }
    }

    cancel.cancel();
    let _ = watchdog.await;
    let _ = writer.await;
    presence.disconnect(&conn.id);
    info!(connection_id = %conn.id, dropped = conn.drop_count(), "presence client disconnected");
}

/// Parse and dispatch one inbound presence-channel text message.
///
/// Malformed payloads and full rooms answer the sender with an `error`
/// message; the connection itself stays open.
fn handle_presence_text(
    presence: &PresenceBroadcaster,
    conn: &Arc<ClientConnection>,
    text: &str,
) {
    // Any inbound traffic counts as liveness.
    conn.mark_alive();

    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(connection_id = %conn.id, "invalid presence message");
            let reply = ServerMessage::Error {
                message: format!("invalid message: {e}"),
            };
            let _ = conn.send(Arc::new(reply.to_json()));
            return;
        }
    };

    match message {
        ClientMessage::JoinRoom { room, name } => {
            if let Err(e) = presence.join(&conn.id, &room, name) {
                let reply = ServerMessage::Error {
                    message: e.to_string(),
                };
                let _ = conn.send(Arc::new(reply.to_json()));
            }
        }
        ClientMessage::CursorUpdate { room, cursor } => {
            presence.cursor_update(&conn.id, &room, cursor);
        }
        ClientMessage::LeaveRoom { room } => presence.leave(&conn.id, &room),
    }
}

/// Drive one sync-channel connection to completion.
///
/// The room is fixed for the socket's lifetime. Frames are relayed
/// verbatim in both directions; nothing here inspects payloads.
pub async fn serve_sync_socket(
    mut socket: WebSocket,
    room: String,
    relay: Arc<SyncRelay>,
    send_queue: usize,
    shutdown: CancellationToken,
) {
    let peer_id = next_peer_id();
    let (tx, mut rx) = mpsc::channel::<Arc<SyncFrame>>(send_queue);
    if let Err(e) = relay.attach(&room, &peer_id, tx) {
        warn!(peer_id, room, error = %e, "sync peer rejected");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code::AGAIN,
                reason: e.to_string().into(),
            })))
            .await;
        return;
    }
    info!(peer_id, room, "sync peer connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let cancel = shutdown.child_token();

    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = rx.recv() => match frame {
                    Some(frame) => {
                        let msg = match frame.as_ref() {
                            SyncFrame::Text(text) => Message::Text(text.as_str().into()),
                            SyncFrame::Binary(bytes) => Message::Binary(bytes.clone()),
                        };
                        if ws_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                () = writer_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    relay.broadcast(&room, &peer_id, SyncFrame::Text(text.to_string()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    relay.broadcast(&room, &peer_id, SyncFrame::Binary(bytes));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(peer_id, room, error = %e, "sync socket error");
                    break;
                }
            },
            () = cancel.cancelled() => break,
        }
    }

    cancel.cancel();
    let _ = writer.await;
    relay.detach(&room, &peer_id);
    info!(peer_id, room, "sync peer disconnected");
}
