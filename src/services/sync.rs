//! Synchronization engine: the five realtime event kinds.
//!
//! DESIGN
//! ======
//! Each handler resolves the sender's room, applies its change under the
//! room's lock, fans the frame out inside that same boundary, and only then
//! schedules a detached checkpoint. Fan-out never waits on storage.
//!
//! Events from a connection that hasn't joined a room return `NotJoined`;
//! the gateway drops those without a reply. A wrong reset secret returns
//! `Forbidden` and leaves the room untouched.

use std::collections::HashSet;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::element::{Element, StrokeFragment};
use crate::frame::{Data, Frame};
use crate::rate_limit::{RateLimitError, RateLimiter};
use crate::services::room::Mutation;
use crate::state::AppState;

// =============================================================================
// EVENT NAMES
// =============================================================================

pub const EVENT_JOIN: &str = "room:join";
pub const EVENT_CURSOR: &str = "cursor:move";
pub const EVENT_STROKE: &str = "draw:stroke";
pub const EVENT_ELEMENT: &str = "draw:element";
pub const EVENT_RESET: &str = "board:reset";
pub const EVENT_INIT: &str = "init";

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("not joined to a room")]
    NotJoined,
    #[error("Forbidden")]
    Forbidden,
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl crate::frame::ErrorCode for SyncError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotJoined => "E_NOT_JOINED",
            Self::Forbidden => "E_FORBIDDEN",
            Self::RateLimited(_) => "E_RATE_LIMITED",
            Self::Malformed(_) => "E_MALFORMED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

// =============================================================================
// DRAWING
// =============================================================================

/// Merge a stroke fragment into the sender's room and relay it verbatim.
///
/// # Errors
///
/// `NotJoined` before a join; `Malformed` if the payload isn't a fragment.
pub async fn append_stroke(state: &AppState, client_id: Uuid, req: &Frame) -> Result<(), SyncError> {
    let room_id = joined_room(state, client_id).await?;
    let fragment: StrokeFragment = serde_json::from_value(req.payload())?;

    let relay = relay_frame(EVENT_STROKE, req.data.clone(), &room_id, client_id);
    state
        .rooms
        .apply(&room_id, Mutation::AppendStroke(fragment), Some((&relay, Some(client_id))))
        .await;
    state.persistence.checkpoint(&room_id);
    Ok(())
}

/// Insert a shape or text element into the sender's room and relay it.
///
/// # Errors
///
/// `NotJoined` before a join; `Malformed` if the payload isn't a rect,
/// circle, line or text element. Strokes travel as `draw:stroke` only.
pub async fn append_element(state: &AppState, client_id: Uuid, req: &Frame) -> Result<(), SyncError> {
    let room_id = joined_room(state, client_id).await?;
    let element: Element = serde_json::from_value(req.payload())?;
    if matches!(element, Element::Stroke(_)) {
        return Err(SyncError::Malformed(serde::de::Error::custom("strokes must be sent as draw:stroke")));
    }
    debug!(%room_id, %client_id, kind = element.kind(), "element appended");

    let relay = relay_frame(EVENT_ELEMENT, req.data.clone(), &room_id, client_id);
    state
        .rooms
        .apply(&room_id, Mutation::AppendElement(element), Some((&relay, Some(client_id))))
        .await;
    state.persistence.checkpoint(&room_id);
    Ok(())
}

/// Relay a cursor position to the rest of the room. Nothing is stored.
///
/// # Errors
///
/// `NotJoined` before a join.
pub async fn move_cursor(state: &AppState, client_id: Uuid, req: &Frame) -> Result<(), SyncError> {
    let room_id = joined_room(state, client_id).await?;
    let Some(room) = state.rooms.get(&room_id).await else {
        return Ok(());
    };

    let mut data = req.data.clone();
    data.insert("id".into(), serde_json::json!(client_id));
    let relay = relay_frame(EVENT_CURSOR, data, &room_id, client_id);
    room.lock().await.broadcast(&relay, Some(client_id));
    Ok(())
}

// =============================================================================
// RESET
// =============================================================================

/// Clear the sender's room and notify every member, sender included.
///
/// # Errors
///
/// `NotJoined` before a join; `RateLimited` when failed attempts have spent
/// the realtime budget; `Forbidden` when `token` doesn't match the configured secret.
pub async fn reset_room(state: &AppState, client_id: Uuid, token: Option<&str>) -> Result<(), SyncError> {
    let room_id = joined_room(state, client_id).await?;
    authorize_reset(state, &state.reset_limiter, Some(client_id), token)?;

    let notice = Frame::request(EVENT_RESET, Data::new()).with_room_id(&room_id);
    state.rooms.replace_all(&room_id, Vec::new(), Some((&notice, None))).await;
    state.persistence.checkpoint(&room_id);

    info!(%room_id, %client_id, "room reset");
    Ok(())
}

/// Clear every room and notify every live connection. Returns the number of
/// rooms cleared.
///
/// # Errors
///
/// `RateLimited` when failed attempts have spent the HTTP budget; `Forbidden` when
/// `token` doesn't match the configured secret.
pub async fn reset_all(state: &AppState, token: Option<&str>) -> Result<usize, SyncError> {
    authorize_reset(state, &state.admin_reset_limiter, None, token)?;

    let room_ids = state.rooms.room_ids().await;
    let mut notified: HashSet<Uuid> = HashSet::new();
    for room_id in &room_ids {
        let Some(room) = state.rooms.get(room_id).await else {
            continue;
        };
        let notice = Frame::request(EVENT_RESET, Data::new()).with_room_id(room_id);
        {
            let mut room = room.lock().await;
            room.replace_all(Vec::new());
            room.broadcast(&notice, None);
            notified.extend(room.members.keys().copied());
        }
        state.persistence.checkpoint(room_id);
    }

    // Connections that never joined a room still hear about the reset.
    let notice = Frame::request(EVENT_RESET, Data::new());
    for (client_id, tx) in state.sessions.connections().await {
        if notified.contains(&client_id) {
            continue;
        }
        if tx.try_send(notice.clone()).is_err() {
            debug!(%client_id, "reset notice dropped");
        }
    }

    info!(rooms = room_ids.len(), "global reset");
    Ok(room_ids.len())
}

// =============================================================================
// HELPERS
// =============================================================================

async fn joined_room(state: &AppState, client_id: Uuid) -> Result<String, SyncError> {
    state
        .sessions
        .room_of(client_id)
        .await
        .ok_or(SyncError::NotJoined)
}

fn relay_frame(syscall: &str, data: Data, room_id: &str, client_id: Uuid) -> Frame {
    Frame::request(syscall, data)
        .with_room_id(room_id)
        .with_from(client_id.to_string())
}

/// Gate a reset on `limiter`, then on the secret. Only a wrong secret is
/// charged to the limiter.
fn authorize_reset(
    state: &AppState,
    limiter: &RateLimiter,
    client_id: Option<Uuid>,
    token: Option<&str>,
) -> Result<(), SyncError> {
    if let Err(e) = limiter.check(client_id) {
        warn!(client_id = ?client_id, error = %e, "reset attempt rate limited");
        return Err(e.into());
    }
    if !secret_matches(&state.config.reset_token, token.unwrap_or_default()) {
        limiter.record_failure(client_id);
        warn!(client_id = ?client_id, "reset attempt with wrong token");
        return Err(SyncError::Forbidden);
    }
    Ok(())
}

/// Compare secrets by SHA-256 digest. An unset secret matches nothing.
pub(crate) fn secret_matches(expected: &str, provided: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    Sha256::digest(expected.as_bytes()) == Sha256::digest(provided.as_bytes())
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
