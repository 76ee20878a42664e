//! Real-time WebSocket endpoint
//!
//! One connection per device. The token is validated before any protocol
//! is spoken; every outbound frame (acks, broadcasts, transport pings)
//! goes through a single writer task so per-connection ordering holds.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::auth::bearer_token;
use super::ApiState;
use crate::auth::SessionContext;
use crate::hub::{ActivityTracker, AuthEvent, ClientMessage, ServerMessage};

/// Optional query parameters for the WebSocket connection
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsQuery {
    /// Token fallback for clients that cannot set headers
    token: Option<String>,

    /// Target device override; defaults to the token's device
    device_id: Option<String>,
}

/// Build the WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

async fn ws_upgrade(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = bearer_token(&headers)
        .map(ToString::to_string)
        .or(query.token);
    ws.on_upgrade(move |socket| handle_socket(socket, state, token, query.device_id))
}

async fn handle_socket(
    mut socket: WebSocket,
    state: Arc<ApiState>,
    token: Option<String>,
    device_override: Option<String>,
) {
    // A bad credential is fatal to the connection: close with protocol
    // error semantics before any protocol is attempted
    let session = match token.as_deref().map(|t| state.sessions.validate(t)) {
        Some(Ok(session)) => session,
        _ => {
            tracing::debug!("rejecting websocket with missing or invalid token");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::PROTOCOL,
                    reason: "authentication failed".into(),
                })))
                .await;
            return;
        }
    };

    let device_id = device_override.unwrap_or_else(|| session.device_id.clone());

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let handle = state.hub.connect(&session.user_id, Some(&device_id)).await;
    let client_id = handle.client_id;
    let tx = handle.sender;
    let mut rx = handle.receiver;

    let welcome = ServerMessage::Welcome {
        user_id: session.user_id.clone(),
        device_id: Some(device_id.clone()),
        client_id: client_id.clone(),
        timestamp: chrono::Utc::now(),
    };
    let _ = tx.send(welcome).await;

    let activity = Arc::new(ActivityTracker::new());

    // Writer: the only task that touches the socket sink. Drains the
    // outbound queue and interleaves transport-level heartbeat pings.
    let heartbeat_interval = state.heartbeat_interval;
    let heartbeat_timeout = state.heartbeat_timeout;
    let writer_activity = Arc::clone(&activity);
    let writer_client_id = client_id.clone();
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(heartbeat_interval);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it
        heartbeat.tick().await;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    let Ok(text) = serde_json::to_string(&msg) else { continue };
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if writer_activity.is_stale(heartbeat_timeout) {
                        tracing::info!(client_id = %writer_client_id, "liveness timeout, closing connection");
                        let _ = ws_sender
                            .send(Message::Close(Some(CloseFrame {
                                code: close_code::NORMAL,
                                reason: "liveness timeout".into(),
                            })))
                            .await;
                        break;
                    }
                    if ws_sender.send(Message::Ping(axum::body::Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Reader: every inbound frame counts as liveness, including the
    // transport pongs our heartbeat elicits
    let reader_state = Arc::clone(&state);
    let reader_session = session.clone();
    let reader_device_id = device_id.clone();
    let reader_client_id = client_id.clone();
    let reader_activity = Arc::clone(&activity);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            reader_activity.touch();
            match msg {
                Message::Text(text) => {
                    handle_frame(
                        &text,
                        &reader_state,
                        &reader_session,
                        &reader_device_id,
                        &reader_client_id,
                        &tx,
                    )
                    .await;
                }
                Message::Close(_) => {
                    tracing::debug!(client_id = %reader_client_id, "websocket closed by client");
                    break;
                }
                // Pong and binary frames only feed the liveness tracker;
                // incoming pings are answered by the transport layer
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Remove from every channel set first, then announce: the closing
    // connection never observes its own removal
    if let Some(closed) = state.hub.disconnect(&client_id).await {
        if let Some(device_id) = closed.device_id {
            state
                .hub
                .broadcast_to_user(&AuthEvent::device_removed(
                    &device_id,
                    &closed.user_id,
                    "disconnected",
                ))
                .await;
        }
    }
}

/// Handle one inbound JSON frame.
///
/// Malformed JSON and unrecognized types are ignored; a bad message is
/// never fatal to the connection.
async fn handle_frame(
    text: &str,
    state: &Arc<ApiState>,
    session: &SessionContext,
    device_id: &str,
    client_id: &str,
    tx: &mpsc::Sender<ServerMessage>,
) {
    let Ok(msg) = serde_json::from_str::<ClientMessage>(text) else {
        tracing::trace!(client_id, "ignoring unrecognized frame");
        return;
    };

    match msg {
        ClientMessage::Ping { timestamp } => {
            let _ = tx.send(ServerMessage::Pong { timestamp }).await;
        }
        ClientMessage::Subscribe { channels } => {
            let granted = state.hub.subscribe(client_id, &channels).await;
            let _ = tx.send(ServerMessage::Subscribed { channels: granted }).await;
        }
        ClientMessage::Unsubscribe { channels } => {
            let removed = state.hub.unsubscribe(client_id, &channels).await;
            let _ = tx
                .send(ServerMessage::Unsubscribed { channels: removed })
                .await;
        }
        ClientMessage::ProximityUpdate { rssi } => {
            let result = state
                .proximity
                .update(
                    device_id,
                    &session.user_id,
                    rssi,
                    Some(session.session_id.clone()),
                )
                .await;

            match result {
                Ok(status) => {
                    state
                        .hub
                        .broadcast_to_user(&AuthEvent::proximity_changed(
                            device_id,
                            &session.user_id,
                            rssi,
                            &status,
                        ))
                        .await;
                }
                Err(e) => {
                    tracing::debug!(client_id, error = %e, "ignoring invalid proximity update");
                }
            }
        }
    }
}
