//! Collab HTTP routes.

use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::element::Element;
use crate::services::session;
use crate::services::sync::{self, SyncError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub ok: bool,
    pub code: String,
    pub expires_at: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateQuery {
    pub room_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub elements: Vec<Element>,
}

/// `POST /collab/create`: allocate a room and issue its join code.
pub async fn create_room(State(state): State<AppState>) -> Json<CreateRoomResponse> {
    let created = session::create_room(&state).await;
    Json(CreateRoomResponse { ok: true, code: created.issued.code, expires_at: created.issued.expires_at })
}

/// `GET /state?roomId=`: current elements of a room (default room if unset).
pub async fn get_state(State(state): State<AppState>, Query(query): Query<StateQuery>) -> Json<StateResponse> {
    let room_id = query
        .room_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| state.config.default_room_id.clone());
    let elements = session::room_elements(&state, &room_id).await;
    Json(StateResponse { elements })
}

/// `POST /reset`: clear every room. Requires `Authorization: Bearer <secret>`.
pub async fn reset_all(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match sync::reset_all(&state, bearer_token(&headers)).await {
        Ok(_) => Json(json!({ "ok": true })).into_response(),
        Err(e) => (sync_error_to_status(&e), Json(json!({ "ok": false, "error": e.to_string() }))).into_response(),
    }
}

/// `GET /health`: liveness.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

pub(crate) fn sync_error_to_status(err: &SyncError) -> StatusCode {
    match err {
        SyncError::Forbidden => StatusCode::FORBIDDEN,
        SyncError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        SyncError::NotJoined | SyncError::Malformed(_) => StatusCode::BAD_REQUEST,
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

#[cfg(test)]
#[path = "collab_test.rs"]
mod tests;
