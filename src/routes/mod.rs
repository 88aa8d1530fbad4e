//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the collab HTTP endpoints and the realtime websocket
//! under a single Axum router, with CORS driven by `ALLOWED_ORIGINS` and
//! request tracing on every route.

pub mod collab;
pub mod ws;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the service router.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .route("/health", get(collab::health))
        .route("/collab/create", post(collab::create_room))
        .route("/state", get(collab::get_state))
        .route("/reset", post(collab::reset_all))
        .route("/ws", get(ws::handle_ws))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        return cors.allow_origin(Any);
    }

    let patterns = origins.to_vec();
    cors.allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        origin
            .to_str()
            .is_ok_and(|origin| patterns.iter().any(|pattern| origin_matches(pattern, origin)))
    }))
}

/// Match an origin against a pattern where `*` stands for any run of
/// characters, e.g. `https://*.vercel.app`.
pub(crate) fn origin_matches(pattern: &str, origin: &str) -> bool {
    let mut segments = pattern.split('*');
    let Some(head) = segments.next() else {
        return false;
    };
    let Some(mut rest) = origin.strip_prefix(head) else {
        return false;
    };

    let segments: Vec<&str> = segments.collect();
    let Some((tail, middle)) = segments.split_last() else {
        // No wildcard: exact match.
        return rest.is_empty();
    };
    for segment in middle {
        let Some(at) = rest.find(segment) else {
            return false;
        };
        rest = &rest[at + segment.len()..];
    }
    rest.ends_with(tail)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
