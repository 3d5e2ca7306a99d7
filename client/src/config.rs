use std::env;
use std::time::Duration;

pub const DEV_SERVER_URL: &str = "http://localhost:3001";
pub const PRODUCTION_SERVER_URL: &str = "https://bolrailway-production.up.railway.app";

// 🔐 Window session timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub ttl: Duration,               // a record older than this is treated as gone
    pub heartbeat_interval: Duration, // how often the active tab refreshes loginTime
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

// 🎮 Client-side configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_url: String,
    pub session: SessionConfig,
    pub watch_interval: Duration, // poll period for file-backed shared storage
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEV_SERVER_URL.to_string(),
            session: SessionConfig::default(),
            watch_interval: Duration::from_millis(250),
        }
    }
}

impl ClientConfig {
    /// `BOL_SERVER_URL` wins; otherwise `BOL_PRODUCTION` picks the hosted server.
    pub fn from_env() -> Self {
        Self {
            server_url: resolve_server_url(
                env::var("BOL_SERVER_URL").ok(),
                env::var("BOL_PRODUCTION").ok(),
            ),
            ..Self::default()
        }
    }

    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into();
        self
    }
}

fn resolve_server_url(explicit: Option<String>, production: Option<String>) -> String {
    if let Some(url) = explicit.filter(|url| !url.trim().is_empty()) {
        return url.trim().trim_end_matches('/').to_string();
    }
    match production.as_deref().map(str::trim) {
        Some("1") | Some("true") | Some("yes") => PRODUCTION_SERVER_URL.to_string(),
        _ => DEV_SERVER_URL.to_string(),
    }
}
