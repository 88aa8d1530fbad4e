//! In-memory rate limiting for reset attempts.
//!
//! DESIGN
//! ======
//! Sliding-window counters backed by `HashMap<Uuid, VecDeque<Instant>>`.
//! Only rejected attempts (wrong secret) are recorded. Two limits apply:
//! - Per-client: `RESET_RATE_LIMIT_PER_CLIENT` failures per window
//! - Global: `RESET_RATE_LIMIT_GLOBAL` failures per window
//!
//! Each limiter instance keeps its own global window. The realtime channel
//! and the HTTP reset endpoint hold separate instances, so guesses on one
//! path never spend the other's budget.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::config::env_parse;

const DEFAULT_PER_CLIENT_LIMIT: usize = 5;
const DEFAULT_GLOBAL_LIMIT: usize = 30;
const DEFAULT_WINDOW_SECS: u64 = 60;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub per_client_limit: usize,
    pub global_limit: usize,
    pub window: Duration,
}

impl RateLimitConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            per_client_limit: env_parse("RESET_RATE_LIMIT_PER_CLIENT", DEFAULT_PER_CLIENT_LIMIT),
            global_limit: env_parse("RESET_RATE_LIMIT_GLOBAL", DEFAULT_GLOBAL_LIMIT),
            window: Duration::from_secs(env_parse("RESET_RATE_LIMIT_WINDOW_SECS", DEFAULT_WINDOW_SECS)),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_client_limit: DEFAULT_PER_CLIENT_LIMIT,
            global_limit: DEFAULT_GLOBAL_LIMIT,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
        }
    }
}

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum RateLimitError {
    #[error("per-client reset limit exceeded (max {limit} attempts/{window_secs}s)")]
    PerClientExceeded { limit: usize, window_secs: u64 },
    #[error("global reset limit exceeded (max {limit} attempts/{window_secs}s)")]
    GlobalExceeded { limit: usize, window_secs: u64 },
}

impl crate::frame::ErrorCode for RateLimitError {
    fn error_code(&self) -> &'static str {
        "E_RATE_LIMITED"
    }

    fn retryable(&self) -> bool {
        true
    }
}

// =============================================================================
// RATE LIMITER
// =============================================================================

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<RateLimiterInner>>,
    config: RateLimitConfig,
}

#[derive(Default)]
struct RateLimiterInner {
    /// Per-client attempt timestamps.
    client_attempts: HashMap<Uuid, VecDeque<Instant>>,
    /// Global attempt timestamps.
    global_attempts: VecDeque<Instant>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self { inner: Arc::new(Mutex::new(RateLimiterInner::default())), config }
    }

    /// Check both limits for `client_id` without recording anything.
    ///
    /// HTTP callers have no connection identity and pass `None`; they are
    /// held to the global limit only.
    ///
    /// # Errors
    ///
    /// Returns the first limit already spent.
    pub fn check(&self, client_id: Option<Uuid>) -> Result<(), RateLimitError> {
        self.check_at(client_id, Instant::now())
    }

    /// Record a rejected attempt against both windows.
    pub fn record_failure(&self, client_id: Option<Uuid>) {
        self.record_failure_at(client_id, Instant::now());
    }

    pub(crate) fn check_at(&self, client_id: Option<Uuid>, now: Instant) -> Result<(), RateLimitError> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let cfg = self.config;

        prune_window(&mut inner.global_attempts, now, cfg.window);
        if inner.global_attempts.len() >= cfg.global_limit {
            return Err(RateLimitError::GlobalExceeded { limit: cfg.global_limit, window_secs: cfg.window.as_secs() });
        }

        if let Some(client_deque) = client_id.and_then(|id| inner.client_attempts.get_mut(&id)) {
            prune_window(client_deque, now, cfg.window);
            if client_deque.len() >= cfg.per_client_limit {
                return Err(RateLimitError::PerClientExceeded {
                    limit: cfg.per_client_limit,
                    window_secs: cfg.window.as_secs(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn record_failure_at(&self, client_id: Option<Uuid>, now: Instant) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(client_id) = client_id {
            inner.client_attempts.entry(client_id).or_default().push_back(now);
        }
        inner.global_attempts.push_back(now);
    }

    /// Drop the per-client history of a disconnected client.
    pub fn forget(&self, client_id: Uuid) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.client_attempts.remove(&client_id);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn prune_window(deque: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = deque.front() {
        if now.duration_since(front) > window {
            deque.pop_front();
        } else {
            break;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;
