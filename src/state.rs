//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! bundles the independent keyed stores (rooms, join codes, sessions), the
//! persistence gateway, and the reset-attempt limiter. Handlers never touch
//! the maps directly; they go through the service contracts.

use std::sync::Arc;

use crate::config::Config;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::services::code::CodeRegistry;
use crate::services::persistence::{DocumentStore, PersistenceGateway};
use crate::services::room::RoomStore;
use crate::services::session::SessionManager;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum: all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rooms: RoomStore,
    pub codes: CodeRegistry,
    pub sessions: SessionManager,
    pub persistence: PersistenceGateway,
    /// Throttles failed reset attempts on the realtime channel.
    pub reset_limiter: RateLimiter,
    /// Throttles failed attempts on `POST /reset`, kept apart from the
    /// realtime budget.
    pub admin_reset_limiter: RateLimiter,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, store: Option<Arc<dyn DocumentStore>>, limits: RateLimitConfig) -> Self {
        let rooms = RoomStore::new();
        Self {
            codes: CodeRegistry::new(config.code_ttl),
            sessions: SessionManager::new(),
            persistence: PersistenceGateway::new(rooms.clone(), store),
            reset_limiter: RateLimiter::new(limits),
            admin_reset_limiter: RateLimiter::new(limits),
            rooms,
            config: Arc::new(config),
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
