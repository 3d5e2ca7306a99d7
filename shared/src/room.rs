use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// Room payload as pushed by the game server. Only the fields the client acts
// on are typed, everything else rides along in `rest`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl RoomInfo {
    pub fn is_hosted_by(&self, player_id: Option<&str>) -> bool {
        match (self.host_id.as_deref(), player_id) {
            (Some(host), Some(player)) => host == player,
            _ => false,
        }
    }

    pub fn game_path(&self) -> String {
        format!("/game/{}", self.id)
    }
}

/// The `currentRoom` record the client keeps in shared storage so a reload
/// can find its way back into a room.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentRoom {
    pub id: String,
    pub name: String,
    pub is_host: bool,
}

impl CurrentRoom {
    pub fn from_room(room: &RoomInfo, is_host: bool) -> Self {
        Self {
            id: room.id.clone(),
            name: room.name.clone(),
            is_host,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}
