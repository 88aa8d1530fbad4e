//! Frame: the universal message type on the realtime channel.
//!
//! ARCHITECTURE
//! ============
//! Every realtime message is a Frame. Clients send request frames over the
//! WebSocket, the gateway dispatches on `syscall` (the event name, e.g.
//! `draw:stroke`), and the few events that expect an answer (`room:join`)
//! get a done/error reply correlated by `parent_id`.
//!
//! DESIGN
//! ======
//! - Flat data: payload is always `Map<String, Value>`.
//! - Server pushes (`init`, fan-out, `board:reset`) are request frames
//!   stamped with the `room_id` they belong to.
//! - Error replies carry both the structured `code`/`message` pair and the
//!   `ok: false` / `error` keys the browser client checks.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Frame data key for error messages.
pub const FRAME_MESSAGE: &str = "message";

/// Frame data key for grepable error codes.
pub const FRAME_CODE: &str = "code";

/// Frame data key for the retryable flag on error frames.
pub const FRAME_RETRYABLE: &str = "retryable";

/// Frame data key for the success flag on replies.
pub const FRAME_OK: &str = "ok";

/// Frame data key for the human-readable error on failed replies.
pub const FRAME_ERROR: &str = "error";

// =============================================================================
// TYPES
// =============================================================================

/// Flat key-value payload. Alias to reduce noise in signatures.
pub type Data = HashMap<String, serde_json::Value>;

/// Lifecycle position of a frame.
///
/// Every answered exchange is `request → done` or `request → error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Request,
    Done,
    Error,
}

impl Status {
    /// Terminal statuses end an exchange.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Done | Status::Error)
    }
}

/// The universal message type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    /// Milliseconds since Unix epoch. Set automatically at construction.
    #[serde(default)]
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    pub syscall: String,
    #[serde(default = "default_status")]
    pub status: Status,
    #[serde(default)]
    pub data: Data,
}

fn default_status() -> Status {
    Status::Request
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for structured error frames.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Frame {
    /// Create a request frame. Entry point for every event.
    pub fn request(syscall: impl Into<String>, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            ts: now_ms(),
            room_id: None,
            from: None,
            syscall: syscall.into(),
            status: Status::Request,
            data,
        }
    }

    /// Create a done response carrying a payload. Terminal.
    #[must_use]
    pub fn done_with(&self, data: Data) -> Self {
        self.reply(Status::Done, data)
    }

    /// Create an error response from a plain string. Terminal.
    #[must_use]
    pub fn error(&self, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut data = Data::new();
        data.insert(FRAME_OK.into(), serde_json::Value::Bool(false));
        data.insert(FRAME_ERROR.into(), serde_json::Value::String(message.clone()));
        data.insert(FRAME_MESSAGE.into(), serde_json::Value::String(message));
        self.reply(Status::Error, data)
    }

    /// Create a structured error response from a typed error. Terminal.
    #[must_use]
    pub fn error_from(&self, err: &(impl ErrorCode + ?Sized)) -> Self {
        let message = err.to_string();
        let mut data = Data::new();
        data.insert(FRAME_OK.into(), serde_json::Value::Bool(false));
        data.insert(FRAME_ERROR.into(), serde_json::Value::String(message.clone()));
        data.insert(FRAME_CODE.into(), serde_json::Value::String(err.error_code().to_string()));
        data.insert(FRAME_MESSAGE.into(), serde_json::Value::String(message));
        data.insert(FRAME_RETRYABLE.into(), serde_json::Value::Bool(err.retryable()));
        self.reply(Status::Error, data)
    }

    /// Build a reply frame. Inherits `parent_id`, `room_id`, and `syscall`.
    fn reply(&self, status: Status, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: Some(self.id),
            ts: now_ms(),
            room_id: self.room_id.clone(),
            from: None,
            syscall: self.syscall.clone(),
            status,
            data,
        }
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

impl Frame {
    #[must_use]
    pub fn with_room_id(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// PAYLOAD ACCESS
// =============================================================================

impl Frame {
    /// The payload as a JSON object, for typed deserialization.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        serde_json::Value::Object(self.data.clone().into_iter().collect())
    }

    /// Read a string field from the payload.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
