//! What the client does with server-pushed events that touch its stored
//! session: restart detection, reconnection, resets and room membership.
//! Everything else is relayed untouched for the views to render.

use std::time::Duration;

use shared::{ClientEvent, CurrentRoom, RoomInfo, ServerEvent};
use tracing::{info, warn};

use crate::arbiter::SessionArbiter;
use crate::login::{resume_player, PageAccess, RedirectReason, LOBBY_PATH};
use crate::storage::{SharedStorage, Storage};
use crate::window_session::{
    BOTS_AVAILABLE_KEY, CURRENT_ROOM_KEY, PLAYER_ID_KEY, PLAYER_NAME_KEY, SERVER_SESSION_KEY,
};

pub const RESTART_GRACE: Duration = Duration::from_secs(1);
pub const RESET_REDIRECT_DELAY: Duration = Duration::from_millis(500);
pub const JOIN_ERROR_REDIRECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    Navigate { path: String, after: Duration },
    /// Reconnected while already on a game page; the page refreshes in place.
    SessionRestored {
        room: RoomInfo,
        player_name: Option<String>,
        player_id: Option<String>,
    },
    /// Call [`Connection::restart_grace_elapsed`] once this much time passed.
    ScheduleRestartCheck { after: Duration },
    Disconnect,
    ShowError(String),
    Relay(ServerEvent),
}

impl ClientAction {
    fn navigate(path: impl Into<String>) -> Self {
        ClientAction::Navigate {
            path: path.into(),
            after: Duration::ZERO,
        }
    }
}

pub fn is_game_path(path: &str) -> bool {
    path.starts_with("/game/")
}

#[derive(Clone)]
pub struct Connection {
    arbiter: SessionArbiter,
}

impl Connection {
    pub fn new(arbiter: SessionArbiter) -> Self {
        Self { arbiter }
    }

    /// Value of the `browserSessionId` query parameter on connect.
    pub fn browser_session_id(&self) -> String {
        self.arbiter.identity().browser_session_id()
    }

    /// Lobby entry: the `join-lobby` event to emit for the resumed player,
    /// or the path to redirect to instead.
    pub fn enter_lobby(&self) -> Result<ClientEvent, String> {
        match resume_player(&self.arbiter) {
            PageAccess::Granted { player_name } => Ok(ClientEvent::JoinLobby {
                name: player_name,
                user_id: self.shared().get_item(PLAYER_ID_KEY),
            }),
            PageAccess::Redirect(path) => Err(path),
        }
    }

    pub fn current_room(&self) -> Option<CurrentRoom> {
        self.shared()
            .get_item(CURRENT_ROOM_KEY)
            .and_then(|raw| CurrentRoom::from_json(&raw))
    }

    pub fn handle(&self, event: ServerEvent, current_path: &str) -> Vec<ClientAction> {
        match event {
            ServerEvent::ServerSession {
                session_id,
                reconnected,
                bots_available,
            } => self.on_server_session(&session_id, reconnected, bots_available),
            ServerEvent::Reconnected {
                player_name,
                player_id,
                room,
            } => self.on_reconnected(player_name, player_id, room, current_path),
            ServerEvent::ServerReset { message } => {
                info!("🔄 Server reset detected: {}", message);
                self.arbiter.hard_reset();
                vec![
                    ClientAction::Disconnect,
                    ClientAction::Navigate {
                        path: RedirectReason::Reset.login_path(),
                        after: RESET_REDIRECT_DELAY,
                    },
                ]
            }
            ServerEvent::LobbyJoined {
                rooms,
                player_id,
            } => {
                info!("✅ Lobby joined, received rooms: {}", rooms.len());
                if let Some(player_id) = &player_id {
                    self.shared().set_item(PLAYER_ID_KEY, player_id);
                }
                vec![ClientAction::Relay(ServerEvent::LobbyJoined { rooms, player_id })]
            }
            ServerEvent::RoomCreated(room) if !is_game_path(current_path) => {
                self.remember_room(&room, true);
                vec![ClientAction::navigate(room.game_path())]
            }
            ServerEvent::RoomJoined(room) if !is_game_path(current_path) => {
                self.remember_room(&room, false);
                vec![ClientAction::navigate(room.game_path())]
            }
            ServerEvent::RoomLeft(_) => {
                self.leave_room();
                vec![ClientAction::navigate(LOBBY_PATH)]
            }
            ServerEvent::JoinRoomError(message) => {
                let mut actions = vec![ClientAction::ShowError(message)];
                if is_game_path(current_path) {
                    actions.push(ClientAction::Navigate {
                        path: LOBBY_PATH.to_string(),
                        after: JOIN_ERROR_REDIRECT_DELAY,
                    });
                }
                actions
            }
            ServerEvent::CreateRoomError(message) => vec![ClientAction::ShowError(message)],
            ServerEvent::NameTaken { message } => vec![
                ClientAction::ShowError(format!("❌ {message}")),
                ClientAction::navigate(RedirectReason::NameConflict.login_path()),
            ],
            other => vec![ClientAction::Relay(other)],
        }
    }

    /// Runs after [`RESTART_GRACE`] following a server restart. Without a
    /// restored session the cached player and room are stale.
    pub fn restart_grace_elapsed(&self, current_path: &str) -> bool {
        if is_game_path(current_path) || current_path.starts_with(LOBBY_PATH) {
            return false;
        }
        info!("No session restored, clearing local data");
        self.shared().remove_item(PLAYER_NAME_KEY);
        self.shared().remove_item(CURRENT_ROOM_KEY);
        true
    }

    /// Local half of leaving a room; also the fallback when the server never
    /// confirms.
    pub fn leave_room(&self) {
        self.shared().remove_item(CURRENT_ROOM_KEY);
    }

    fn on_server_session(
        &self,
        session_id: &str,
        reconnected: bool,
        bots_available: Option<bool>,
    ) -> Vec<ClientAction> {
        let last = self.shared().get_item(SERVER_SESSION_KEY);
        self.shared().set_item(SERVER_SESSION_KEY, session_id);

        if reconnected {
            info!("✅ Reconnected to existing session");
            self.remember_bots(bots_available);
            return Vec::new();
        }

        if last.as_deref().is_some_and(|last| last != session_id) {
            warn!("🔄 Server restart detected");
            return vec![ClientAction::ScheduleRestartCheck {
                after: RESTART_GRACE,
            }];
        }

        self.remember_bots(bots_available);
        Vec::new()
    }

    fn on_reconnected(
        &self,
        player_name: Option<String>,
        player_id: Option<String>,
        room: Option<RoomInfo>,
        current_path: &str,
    ) -> Vec<ClientAction> {
        info!("🎉 Successfully reconnected to session");
        if let Some(name) = &player_name {
            self.shared().set_item(PLAYER_NAME_KEY, name);
            self.arbiter.tab_store().set_item(PLAYER_NAME_KEY, name);
        }

        let Some(room) = room else {
            return Vec::new();
        };
        let is_host = room.is_hosted_by(player_id.as_deref());
        self.remember_room(&room, is_host);

        if is_game_path(current_path) {
            vec![ClientAction::SessionRestored {
                room,
                player_name,
                player_id,
            }]
        } else {
            info!("Redirecting to game room: {}", room.id);
            vec![ClientAction::navigate(room.game_path())]
        }
    }

    fn remember_room(&self, room: &RoomInfo, is_host: bool) {
        let current = CurrentRoom::from_room(room, is_host);
        self.shared().set_item(CURRENT_ROOM_KEY, &current.to_json());
    }

    fn remember_bots(&self, bots_available: Option<bool>) {
        if let Some(enabled) = bots_available {
            self.shared()
                .set_item(BOTS_AVAILABLE_KEY, if enabled { "true" } else { "false" });
            info!(
                "🤖 Bot players are {} on this server",
                if enabled { "ENABLED" } else { "DISABLED" }
            );
        }
    }

    fn shared(&self) -> &dyn SharedStorage {
        self.arbiter.shared_store()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::login::complete_login;
    use crate::storage::{LocalStorage, MemoryStorage};
    use serde_json::json;
    use std::sync::Arc;

    fn connection(shared: &LocalStorage) -> (Connection, SessionArbiter) {
        let arbiter = SessionArbiter::new(Arc::new(shared.tab()), Arc::new(MemoryStorage::new()))
            .with_clock(Arc::new(ManualClock::new(1_000)));
        (Connection::new(arbiter.clone()), arbiter)
    }

    fn room(id: &str, host: &str) -> RoomInfo {
        serde_json::from_value(json!({ "id": id, "name": "Friday", "hostId": host })).unwrap()
    }

    fn server_session(id: &str, reconnected: bool) -> ServerEvent {
        ServerEvent::ServerSession {
            session_id: id.into(),
            reconnected,
            bots_available: Some(true),
        }
    }

    #[test]
    fn first_server_session_is_remembered() {
        let shared = LocalStorage::new();
        let (conn, _) = connection(&shared);

        assert!(conn.handle(server_session("s1", false), "/").is_empty());
        assert_eq!(shared.get_item(SERVER_SESSION_KEY).as_deref(), Some("s1"));
        assert_eq!(shared.get_item(BOTS_AVAILABLE_KEY).as_deref(), Some("true"));
        assert!(conn.handle(server_session("s1", false), "/").is_empty());
    }

    #[test]
    fn new_server_session_schedules_restart_check() {
        let shared = LocalStorage::new();
        let (conn, _) = connection(&shared);
        conn.handle(server_session("s1", false), "/");
        shared.set_item(PLAYER_NAME_KEY, "Ada");
        shared.set_item(CURRENT_ROOM_KEY, "{}");

        let actions = conn.handle(server_session("s2", false), "/");
        assert_eq!(
            actions,
            vec![ClientAction::ScheduleRestartCheck {
                after: RESTART_GRACE
            }]
        );
        assert_eq!(shared.get_item(SERVER_SESSION_KEY).as_deref(), Some("s2"));

        assert!(!conn.restart_grace_elapsed("/lobby"));
        assert_eq!(shared.get_item(PLAYER_NAME_KEY).as_deref(), Some("Ada"));
        assert!(conn.restart_grace_elapsed("/"));
        assert_eq!(shared.get_item(PLAYER_NAME_KEY), None);
        assert_eq!(shared.get_item(CURRENT_ROOM_KEY), None);
    }

    #[test]
    fn reconnected_session_is_not_a_restart() {
        let shared = LocalStorage::new();
        let (conn, _) = connection(&shared);
        conn.handle(server_session("s1", false), "/");
        assert!(conn.handle(server_session("s2", true), "/").is_empty());
    }

    #[test]
    fn reconnect_outside_game_navigates_to_room() {
        let shared = LocalStorage::new();
        let (conn, arbiter) = connection(&shared);

        let actions = conn.handle(
            ServerEvent::Reconnected {
                player_name: Some("Ada".into()),
                player_id: Some("p1".into()),
                room: Some(room("r9", "p1")),
            },
            "/lobby",
        );

        assert_eq!(actions, vec![ClientAction::navigate("/game/r9")]);
        assert_eq!(
            conn.current_room(),
            Some(CurrentRoom {
                id: "r9".into(),
                name: "Friday".into(),
                is_host: true
            })
        );
        assert_eq!(
            arbiter.tab_store().get_item(PLAYER_NAME_KEY).as_deref(),
            Some("Ada")
        );
    }

    #[test]
    fn reconnect_on_game_page_restores_in_place() {
        let shared = LocalStorage::new();
        let (conn, _) = connection(&shared);

        let actions = conn.handle(
            ServerEvent::Reconnected {
                player_name: Some("Ada".into()),
                player_id: Some("p2".into()),
                room: Some(room("r9", "p1")),
            },
            "/game/r9",
        );

        assert!(matches!(actions.as_slice(), [ClientAction::SessionRestored { .. }]));
        assert!(!conn.current_room().unwrap().is_host);
    }

    #[test]
    fn server_reset_wipes_everything() {
        let shared = LocalStorage::new();
        let (conn, arbiter) = connection(&shared);
        complete_login(&arbiter, "Ada");
        let before = arbiter.identity();

        let actions = conn.handle(
            ServerEvent::ServerReset {
                message: "admin reset".into(),
            },
            "/lobby",
        );

        assert_eq!(
            actions,
            vec![
                ClientAction::Disconnect,
                ClientAction::Navigate {
                    path: "/?reset=true".into(),
                    after: RESET_REDIRECT_DELAY
                }
            ]
        );
        assert!(shared.keys().is_empty());
        assert!(arbiter.tab_store().keys().is_empty());
        assert_ne!(arbiter.identity(), before);
    }

    #[test]
    fn room_membership_is_tracked() {
        let shared = LocalStorage::new();
        let (conn, _) = connection(&shared);

        conn.handle(ServerEvent::RoomCreated(room("r1", "p1")), "/lobby");
        assert!(conn.current_room().unwrap().is_host);

        // on the game page room-joined is only a state refresh
        let actions = conn.handle(ServerEvent::RoomJoined(room("r2", "p1")), "/game/r1");
        assert!(matches!(actions.as_slice(), [ClientAction::Relay(_)]));
        assert_eq!(conn.current_room().unwrap().id, "r1");

        let actions = conn.handle(ServerEvent::RoomLeft(json!({})), "/game/r1");
        assert_eq!(actions, vec![ClientAction::navigate(LOBBY_PATH)]);
        assert_eq!(conn.current_room(), None);
    }

    #[test]
    fn name_taken_sends_back_to_login() {
        let shared = LocalStorage::new();
        let (conn, _) = connection(&shared);
        let actions = conn.handle(
            ServerEvent::NameTaken {
                message: "Name in use".into(),
            },
            "/lobby",
        );
        assert_eq!(
            actions[1],
            ClientAction::navigate("/?name-conflict=true")
        );
    }

    #[test]
    fn entering_the_lobby_builds_join_frame() {
        let shared = LocalStorage::new();
        let (conn, arbiter) = connection(&shared);
        assert_eq!(conn.enter_lobby(), Err("/".to_string()));

        complete_login(&arbiter, "Ada");
        shared.set_item(PLAYER_ID_KEY, "p7");

        let (name, data) = conn.enter_lobby().unwrap().to_frame();
        assert_eq!(name, "join-lobby");
        assert_eq!(data, json!({ "name": "Ada", "userId": "p7" }));
    }

    #[test]
    fn lobby_joined_stores_player_id() {
        let shared = LocalStorage::new();
        let (conn, _) = connection(&shared);
        conn.handle(
            ServerEvent::LobbyJoined {
                rooms: vec![],
                player_id: Some("p7".into()),
            },
            "/lobby",
        );
        assert_eq!(shared.get_item(PLAYER_ID_KEY).as_deref(), Some("p7"));
    }
}
