//! Configuration loading and representation.

use std::net::SocketAddr;

use anyhow::{Context, Result};

use fieldhand_observability::LogFormat;

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_SESSION_COOKIE: &str = "fieldhand_session";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Process configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind: SocketAddr,
    /// `None` runs against the in-memory directory.
    pub database_url: Option<String>,
    pub session_cookie: String,
    pub log_format: LogFormat,
    pub db_max_connections: u32,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind = get("FIELDHAND_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse::<SocketAddr>()
            .context("FIELDHAND_BIND must be a socket address like 0.0.0.0:8080")?;

        let session_cookie = get("FIELDHAND_SESSION_COOKIE").unwrap_or_else(|| DEFAULT_SESSION_COOKIE.to_string());
        if !is_valid_cookie_name(&session_cookie) {
            anyhow::bail!("FIELDHAND_SESSION_COOKIE '{session_cookie}' is not a valid cookie name");
        }

        let log_format = match get("FIELDHAND_LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>()?,
            None => LogFormat::default(),
        };

        let db_max_connections = match get("FIELDHAND_DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| format!("FIELDHAND_DB_MAX_CONNECTIONS must be a positive integer, got '{raw}'"))?,
            None => DEFAULT_DB_MAX_CONNECTIONS,
        };

        Ok(Self {
            bind,
            database_url: get("DATABASE_URL"),
            session_cookie,
            log_format,
            db_max_connections,
        })
    }
}

// RFC 6265 token characters.
fn is_valid_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}
