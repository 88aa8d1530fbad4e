//! WebSocket handler: bidirectional frame relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID, registers the connection, and enters a
//! `select!` loop:
//! - Incoming client frames → parse + dispatch by event name
//! - Fan-out frames from room peers → forward to client
//!
//! Only `room:join` is answered. Drawing, cursor and reset events produce no
//! reply; events from a connection that hasn't joined are dropped silently,
//! as are reset attempts with a wrong secret.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `session:connected` with `client_id`
//! 2. `room:join` → send `init` snapshot, then the join reply
//! 3. Draw/cursor/reset events → sync engine → fan-out to peers
//! 4. Close → release the session

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frame::{Data, Frame, Status};
use crate::services::session::{self, SessionError};
use crate::services::sync::{self, EVENT_CURSOR, EVENT_ELEMENT, EVENT_INIT, EVENT_JOIN, EVENT_RESET, EVENT_STROKE, SyncError};
use crate::state::AppState;

/// Outbound buffer per connection. Fan-out to a full buffer is dropped.
const CLIENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();

    // Per-connection channel for receiving fan-out frames from peers.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(CLIENT_CHANNEL_CAPACITY);

    let welcome = Frame::request("session:connected", Data::new()).with_data("client_id", client_id.to_string());
    if send_frame(&mut socket, &welcome).await.is_err() {
        return;
    }
    state.sessions.connect(client_id, client_tx).await;

    let connections = state.sessions.connection_count().await;
    info!(%client_id, connections, "ws: client connected");

    'conn: loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        for frame in process_inbound_text(&state, client_id, text.as_str()).await {
                            if send_frame(&mut socket, &frame).await.is_err() {
                                break 'conn;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    session::release(&state, client_id).await;
    info!(%client_id, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the sender.
///
/// Keeps the websocket transport separate from event handling so tests can
/// drive dispatch without a socket.
async fn process_inbound_text(state: &AppState, client_id: Uuid, text: &str) -> Vec<Frame> {
    let req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound frame");
            let err = Frame::request("gateway:error", Data::new()).with_data("message", format!("invalid json: {e}"));
            return vec![err];
        }
    };

    debug!(%client_id, id = %req.id, syscall = %req.syscall, "ws: recv frame");

    let result = match req.syscall.as_str() {
        EVENT_JOIN => return handle_join(state, client_id, &req).await,
        EVENT_STROKE => sync::append_stroke(state, client_id, &req).await,
        EVENT_ELEMENT => sync::append_element(state, client_id, &req).await,
        EVENT_CURSOR => sync::move_cursor(state, client_id, &req).await,
        EVENT_RESET => sync::reset_room(state, client_id, req.str_field("token")).await,
        other => return vec![req.error(format!("unknown event: {other}"))],
    };

    match result {
        Ok(()) => vec![],
        Err(SyncError::NotJoined) => {
            debug!(%client_id, syscall = %req.syscall, "ws: event before join dropped");
            vec![]
        }
        // No error channel for resets: the room simply doesn't change.
        Err(SyncError::Forbidden | SyncError::RateLimited(_)) => vec![],
        Err(e @ SyncError::Malformed(_)) => vec![req.error_from(&e)],
    }
}

async fn handle_join(state: &AppState, client_id: Uuid, req: &Frame) -> Vec<Frame> {
    let Some(code) = join_code(req) else {
        return vec![req.error_from(&SessionError::InvalidOrExpiredCode)];
    };

    match session::join(state, client_id, &code).await {
        Ok(joined) => {
            let init = Frame::request(EVENT_INIT, Data::new())
                .with_room_id(&joined.room_id)
                .with_data("elements", serde_json::to_value(&joined.elements).unwrap_or_default());

            let mut reply = Data::new();
            reply.insert("ok".into(), serde_json::Value::Bool(true));
            reply.insert("roomId".into(), serde_json::json!(joined.room_id));
            reply.insert("expiresAt".into(), serde_json::json!(joined.expires_at));
            let done = req.done_with(reply).with_room_id(&joined.room_id);

            vec![init, done]
        }
        Err(e) => vec![req.error_from(&e)],
    }
}

/// The join code, sent either as a string or a bare number.
fn join_code(req: &Frame) -> Option<String> {
    let value = req.data.get("code")?;
    value
        .as_str()
        .map(|s| s.trim().to_string())
        .or_else(|| value.as_u64().map(|n| n.to_string()))
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == Status::Error {
        let code = frame
            .data
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        let message = frame
            .data
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    } else if frame.status.is_terminal() {
        info!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
