//! Service configuration parsed from environment variables.
//!
//! Every knob has a typed default so the server starts with no environment
//! at all: no persistence, a 10-minute code TTL, and resets disabled.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CODE_TTL_MS: u64 = 600_000;
pub const DEFAULT_BOARD_ID: &str = "default";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Shared reset secret. Empty disables every reset.
    pub reset_token: String,
    /// Postgres URL for the document store. `None` runs memory-only.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub code_ttl: Duration,
    /// Room served by `GET /state` when no `roomId` is given.
    pub default_room_id: String,
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Build config from the process environment.
    ///
    /// - `PORT`: default 8080
    /// - `RESET_TOKEN`: default empty
    /// - `DATABASE_URL`: optional
    /// - `DB_MAX_CONNECTIONS`: default 5
    /// - `CODE_TTL_MS`: default 600000
    /// - `BOARD_ID`: default `default`
    /// - `ALLOWED_ORIGINS`: comma-separated, default `*`
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            reset_token: std::env::var("RESET_TOKEN").unwrap_or_default(),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            code_ttl: Duration::from_millis(env_parse("CODE_TTL_MS", DEFAULT_CODE_TTL_MS)),
            default_room_id: std::env::var("BOARD_ID").unwrap_or_else(|_| DEFAULT_BOARD_ID.to_string()),
            allowed_origins: parse_origins(&std::env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "*".into())),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            reset_token: String::new(),
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            code_ttl: Duration::from_millis(DEFAULT_CODE_TTL_MS),
            default_room_id: DEFAULT_BOARD_ID.to_string(),
            allowed_origins: vec!["*".into()],
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

pub(crate) fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
