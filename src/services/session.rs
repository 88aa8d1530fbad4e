//! Session manager: live connections and their room bindings.
//!
//! ARCHITECTURE
//! ============
//! Every live websocket is registered here with its outbound sender. A
//! connection is bound to at most one room, and only after redeeming a join
//! code. Joining again rebinds to the newly resolved room and silently
//! leaves the previous one. Disconnect releases everything at once.
//!
//! Joining hydrates the room before the connection becomes a member; the
//! membership insert and the snapshot returned for `init` happen under the
//! room's lock, so the joiner sees every later mutation exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{RwLock, mpsc};
use tracing::info;
use uuid::Uuid;

use crate::element::Element;
use crate::frame::{Frame, now_ms};
use crate::services::code::IssuedCode;
use crate::state::AppState;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Invalid or expired code")]
    InvalidOrExpiredCode,
    /// Internal fault during join. Carries no detail.
    #[error("Join failed")]
    JoinFailed,
}

impl crate::frame::ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidOrExpiredCode => "E_INVALID_OR_EXPIRED_CODE",
            Self::JoinFailed => "E_JOIN_FAILED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::JoinFailed)
    }
}

/// Result of a successful join: the room, the code's expiry, and the
/// element snapshot to push as `init`.
#[derive(Debug, Clone)]
pub struct JoinedRoom {
    pub room_id: String,
    pub expires_at: i64,
    pub elements: Vec<Element>,
}

/// A newly created room and the code that grants access to it.
#[derive(Debug, Clone)]
pub struct CreatedRoom {
    pub room_id: String,
    pub issued: IssuedCode,
}

#[derive(Default)]
struct Sessions {
    /// Every live connection: `client_id` -> sender for outgoing frames.
    connections: HashMap<Uuid, mpsc::Sender<Frame>>,
    /// Joined connections: `client_id` -> `room_id`.
    bindings: HashMap<Uuid, String>,
}

#[derive(Clone, Default)]
pub struct SessionManager {
    inner: Arc<RwLock<Sessions>>,
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live connection (not yet bound to a room).
    pub async fn connect(&self, client_id: Uuid, tx: mpsc::Sender<Frame>) {
        let mut sessions = self.inner.write().await;
        sessions.connections.insert(client_id, tx);
    }

    /// Room the connection is bound to, if it has joined one.
    pub async fn room_of(&self, client_id: Uuid) -> Option<String> {
        self.inner.read().await.bindings.get(&client_id).cloned()
    }

    /// Every live connection with its sender.
    pub async fn connections(&self) -> Vec<(Uuid, mpsc::Sender<Frame>)> {
        let sessions = self.inner.read().await;
        sessions
            .connections
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    async fn sender(&self, client_id: Uuid) -> Option<mpsc::Sender<Frame>> {
        self.inner.read().await.connections.get(&client_id).cloned()
    }

    /// Bind to `room_id`, returning the previous binding.
    async fn bind(&self, client_id: Uuid, room_id: &str) -> Option<String> {
        let mut sessions = self.inner.write().await;
        sessions.bindings.insert(client_id, room_id.to_string())
    }

    /// Forget the connection entirely, returning its room binding.
    async fn remove(&self, client_id: Uuid) -> Option<String> {
        let mut sessions = self.inner.write().await;
        sessions.connections.remove(&client_id);
        sessions.bindings.remove(&client_id)
    }
}

// =============================================================================
// ROOM LIFECYCLE
// =============================================================================

/// Allocate a fresh room and issue a join code for it.
pub async fn create_room(state: &AppState) -> CreatedRoom {
    let room_id = generate_room_id();
    state.rooms.get_or_create(&room_id).await;
    let issued = state.codes.issue(&room_id);
    let rooms = state.rooms.room_count().await;
    info!(
        %room_id,
        expires_at = issued.expires_at,
        rooms,
        codes = state.codes.active_count(),
        "room created"
    );
    CreatedRoom { room_id, issued }
}

/// Current elements of a room, after an opportunistic hydrate.
pub async fn room_elements(state: &AppState, room_id: &str) -> Vec<Element> {
    state.persistence.hydrate(room_id).await;
    state.rooms.snapshot(room_id).await.elements
}

// =============================================================================
// JOIN / RELEASE
// =============================================================================

/// Redeem `code` for `client_id` and bind the connection to its room.
///
/// # Errors
///
/// `InvalidOrExpiredCode` if the code doesn't resolve; `JoinFailed` if the
/// connection isn't registered.
pub async fn join(state: &AppState, client_id: Uuid, code: &str) -> Result<JoinedRoom, SessionError> {
    let grant = state
        .codes
        .resolve(code)
        .map_err(|_| SessionError::InvalidOrExpiredCode)?;
    let Some(tx) = state.sessions.sender(client_id).await else {
        tracing::error!(%client_id, "join from unregistered connection");
        return Err(SessionError::JoinFailed);
    };

    let previous = state.sessions.bind(client_id, &grant.room_id).await;
    if let Some(previous) = previous.filter(|prev| *prev != grant.room_id) {
        leave_room(state, &previous, client_id).await;
    }

    state.persistence.hydrate(&grant.room_id).await;

    let room = state.rooms.get_or_create(&grant.room_id).await;
    let mut room = room.lock().await;
    room.members.insert(client_id, tx);
    let elements = room.elements.clone();
    info!(room_id = %grant.room_id, %client_id, members = room.members.len(), "client joined room");

    Ok(JoinedRoom { room_id: grant.room_id, expires_at: grant.expires_at, elements })
}

/// Drop every trace of a disconnected connection.
///
/// In-flight checkpoints belong to the room and are left to finish.
pub async fn release(state: &AppState, client_id: Uuid) {
    if let Some(room_id) = state.sessions.remove(client_id).await {
        leave_room(state, &room_id, client_id).await;
    }
    state.reset_limiter.forget(client_id);
}

async fn leave_room(state: &AppState, room_id: &str, client_id: Uuid) {
    let Some(room) = state.rooms.get(room_id).await else {
        return;
    };
    let mut room = room.lock().await;
    room.members.remove(&client_id);
    info!(%room_id, %client_id, remaining = room.members.len(), "client left room");
}

// =============================================================================
// HELPERS
// =============================================================================

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".into();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[usize::try_from(n % 36).unwrap_or_default()]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// `room_<base36 ms>_<6 random base36 chars>`.
pub(crate) fn generate_room_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..6)
        .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
        .collect();
    let ms = u64::try_from(now_ms()).unwrap_or(0);
    format!("room_{}_{suffix}", to_base36(ms))
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
