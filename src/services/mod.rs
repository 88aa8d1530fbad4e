//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own room state, join codes, sessions and persistence so
//! route handlers can stay focused on protocol translation.

pub mod code;
pub mod persistence;
pub mod room;
pub mod session;
pub mod sync;
