//! Code registry: short-lived 6-digit join codes mapped to rooms.
//!
//! DESIGN
//! ======
//! Codes live in one `HashMap` behind a std mutex. The lock is held only for
//! lookup/insert; nothing awaits under it. Expired entries are pruned lazily
//! at the start of every operation, so no sweep task is needed.
//!
//! A code is not consumed by `resolve`: any number of participants may join
//! with it until it expires.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use serde::Serialize;

use crate::frame::now_ms;

const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodeError {
    #[error("invalid or expired code")]
    InvalidOrExpired,
}

impl crate::frame::ErrorCode for CodeError {
    fn error_code(&self) -> &'static str {
        "E_INVALID_OR_EXPIRED_CODE"
    }
}

/// A freshly issued code and its absolute expiry (ms since epoch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: i64,
}

/// What a valid code grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeGrant {
    pub room_id: String,
    pub expires_at: i64,
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Clone)]
pub struct CodeRegistry {
    codes: Arc<Mutex<HashMap<String, CodeGrant>>>,
    ttl_ms: i64,
}

impl CodeRegistry {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self { codes: Arc::new(Mutex::new(HashMap::new())), ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX) }
    }

    /// Issue a code for `room_id`, unique among unexpired codes.
    pub fn issue(&self, room_id: &str) -> IssuedCode {
        self.issue_at(room_id, now_ms())
    }

    pub(crate) fn issue_at(&self, room_id: &str, now: i64) -> IssuedCode {
        let mut codes = self
            .codes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        prune_expired(&mut codes, now);

        let mut rng = rand::rng();
        let code = loop {
            let candidate = rng.random_range(CODE_MIN..=CODE_MAX).to_string();
            if !codes.contains_key(&candidate) {
                break candidate;
            }
        };

        let expires_at = now.saturating_add(self.ttl_ms);
        codes.insert(code.clone(), CodeGrant { room_id: room_id.to_string(), expires_at });
        IssuedCode { code, expires_at }
    }

    /// Look up a code. Valid only while `now < expires_at`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOrExpired` for unknown or expired codes.
    pub fn resolve(&self, code: &str) -> Result<CodeGrant, CodeError> {
        self.resolve_at(code, now_ms())
    }

    pub(crate) fn resolve_at(&self, code: &str, now: i64) -> Result<CodeGrant, CodeError> {
        let mut codes = self
            .codes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        prune_expired(&mut codes, now);

        codes
            .get(code)
            .filter(|grant| now < grant.expires_at)
            .cloned()
            .ok_or(CodeError::InvalidOrExpired)
    }

    /// Number of codes currently held, expired or not.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.codes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

fn prune_expired(codes: &mut HashMap<String, CodeGrant>, now: i64) {
    codes.retain(|_, grant| grant.expires_at > now);
}

#[cfg(test)]
#[path = "code_test.rs"]
mod tests;
