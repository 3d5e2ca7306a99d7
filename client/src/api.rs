use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{path} returned status {status}")]
    Status {
        path: String,
        status: reqwest::StatusCode,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NameCheck {
    pub available: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl NameCheck {
    fn unchecked() -> Self {
        Self {
            available: true,
            message: Some("Unable to check name availability".into()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    #[serde(default)]
    pub rss: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerStats {
    pub rooms: u64,
    pub players: u64,
    pub connected_clients: u64,
    pub connected_sockets: u64,
    pub uptime: f64,
    pub memory_usage: MemoryUsage,
    pub server_session_id: String,
}

impl ServerStats {
    pub fn summary(&self) -> String {
        let memory_mb = (self.memory_usage.rss as f64 / 1024.0 / 1024.0).round() as u64;
        let session = &self.server_session_id;
        let tail = session
            .char_indices()
            .rev()
            .nth(7)
            .map_or(session.as_str(), |(at, _)| &session[at..]);
        format!(
            "📊 Server Stats:\n\
             • Rooms: {}\n\
             • Players: {}\n\
             • Connected Clients: {}\n\
             • Socket Connections: {}\n\
             • Uptime: {}s\n\
             • Memory: {}MB\n\
             • Session ID: {}",
            self.rooms,
            self.players,
            self.connected_clients,
            self.connected_sockets,
            self.uptime.round() as u64,
            memory_mb,
            tail
        )
    }
}

/// Snapshot served by `/debug/rooms`. Entries are kept as raw JSON.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct DebugRooms {
    pub rooms: Vec<Value>,
    pub players: Vec<Value>,
}

impl DebugRooms {
    pub fn player_names(&self) -> Vec<String> {
        self.players
            .iter()
            .filter_map(|player| player.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    pub fn room_lines(&self) -> Vec<String> {
        self.rooms
            .iter()
            .map(|room| {
                let name = room.get("name").and_then(Value::as_str).unwrap_or("?");
                let players = room
                    .get("players")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                let max = room.get("maxPlayers").and_then(Value::as_u64).unwrap_or(0);
                format!("\"{name}\" ({players}/{max})")
            })
            .collect()
    }
}

/// HTTP side of the game server: name checks and the admin endpoints.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Asks the server whether `name` is free. Any failure reports the name
    /// as available so an unreachable server never blocks a login.
    pub async fn check_name(&self, name: &str) -> NameCheck {
        let request = self
            .http
            .post(self.url("/api/check-name"))
            .json(&json!({ "name": name.trim() }));
        let result = async {
            let response = request.send().await?;
            response.json::<NameCheck>().await
        }
        .await;
        result.unwrap_or_else(|err| {
            warn!("⚠️ Error checking name availability: {}", err);
            NameCheck::unchecked()
        })
    }

    /// Drops every room and player on the server.
    pub async fn reset_server(&self) -> Result<(), ApiError> {
        let path = "/admin/reset";
        let response = self.http.post(self.url(path)).send().await?;
        Self::ensure_ok(path, &response)?;
        info!("🔄 Server reset requested at {}", self.base_url);
        Ok(())
    }

    pub async fn stats(&self) -> Result<ServerStats, ApiError> {
        self.get_json("/admin/stats").await
    }

    pub async fn debug_rooms(&self) -> Result<DebugRooms, ApiError> {
        self.get_json("/debug/rooms").await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.http.get(self.url(path)).send().await?;
        Self::ensure_ok(path, &response)?;
        Ok(response.json().await?)
    }

    fn ensure_ok(path: &str, response: &reqwest::Response) -> Result<(), ApiError> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ApiError::Status {
                path: path.to_string(),
                status: response.status(),
            })
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
