use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::room::RoomInfo;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown server event `{0}`")]
    UnknownEvent(String),
    #[error("invalid payload for `{event}`: {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

// 📤 Events the client emits on the game socket
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinLobby {
        name: String,
        #[serde(default)]
        user_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    CreateRoom { name: String, max_players: u32 },
    JoinRoom(String),
    LeaveRoom(String),
    StartGame(String),
    #[serde(rename_all = "camelCase")]
    GameAction {
        room_id: String,
        action: String,
        #[serde(default)]
        data: Value,
    },
    #[serde(rename_all = "camelCase")]
    DrawCard { room_id: String },
    #[serde(rename_all = "camelCase")]
    SubmitVote {
        room_id: String,
        target_player_id: String,
        vote: Value,
    },
}

impl ClientEvent {
    /// Splits the event into the `(name, payload)` pair a socket emit takes.
    pub fn to_frame(&self) -> (String, Value) {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        let name = value
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let data = value
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null);
        (name, data)
    }
}

// 📥 Events the game server pushes to the client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    ServerSession {
        session_id: String,
        #[serde(default)]
        reconnected: bool,
        #[serde(default)]
        bots_available: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    Reconnected {
        #[serde(default)]
        player_name: Option<String>,
        #[serde(default)]
        player_id: Option<String>,
        #[serde(default)]
        room: Option<RoomInfo>,
    },
    ServerReset {
        #[serde(default)]
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    LobbyJoined {
        #[serde(default)]
        rooms: Vec<Value>,
        #[serde(default)]
        player_id: Option<String>,
    },
    RoomListUpdated(Vec<Value>),
    PlayerListUpdated(Vec<Value>),
    RoomCreated(RoomInfo),
    RoomJoined(RoomInfo),
    RoomLeft(Value),
    JoinRoomError(String),
    CreateRoomError(String),
    NameTaken {
        #[serde(default)]
        message: String,
    },
    PlayerJoinedRoom { room: RoomInfo },
    PlayerLeftRoom { room: RoomInfo },
    GameStarted(RoomInfo),
    GameUpdated(Value),
    TurnChanged(Value),
    VotingResults(Value),
    GameEnded(Value),
}

impl ServerEvent {
    pub const NAMES: &'static [&'static str] = &[
        "server-session",
        "reconnected",
        "server-reset",
        "lobby-joined",
        "room-list-updated",
        "player-list-updated",
        "room-created",
        "room-joined",
        "room-left",
        "join-room-error",
        "create-room-error",
        "name-taken",
        "player-joined-room",
        "player-left-room",
        "game-started",
        "game-updated",
        "turn-changed",
        "voting-results",
        "game-ended",
    ];

    /// Validates a raw `(name, payload)` pair off the socket.
    pub fn decode(name: &str, payload: Value) -> Result<Self, ProtocolError> {
        if !Self::NAMES.contains(&name) {
            return Err(ProtocolError::UnknownEvent(name.to_string()));
        }
        serde_json::from_value(json!({ "event": name, "data": payload })).map_err(|source| {
            ProtocolError::InvalidPayload {
                event: name.to_string(),
                source,
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::ServerSession { .. } => "server-session",
            ServerEvent::Reconnected { .. } => "reconnected",
            ServerEvent::ServerReset { .. } => "server-reset",
            ServerEvent::LobbyJoined { .. } => "lobby-joined",
            ServerEvent::RoomListUpdated(_) => "room-list-updated",
            ServerEvent::PlayerListUpdated(_) => "player-list-updated",
            ServerEvent::RoomCreated(_) => "room-created",
            ServerEvent::RoomJoined(_) => "room-joined",
            ServerEvent::RoomLeft(_) => "room-left",
            ServerEvent::JoinRoomError(_) => "join-room-error",
            ServerEvent::CreateRoomError(_) => "create-room-error",
            ServerEvent::NameTaken { .. } => "name-taken",
            ServerEvent::PlayerJoinedRoom { .. } => "player-joined-room",
            ServerEvent::PlayerLeftRoom { .. } => "player-left-room",
            ServerEvent::GameStarted(_) => "game-started",
            ServerEvent::GameUpdated(_) => "game-updated",
            ServerEvent::TurnChanged(_) => "turn-changed",
            ServerEvent::VotingResults(_) => "voting-results",
            ServerEvent::GameEnded(_) => "game-ended",
        }
    }
}
