use std::time::Duration;

use serde::Serialize;

use crate::storage::Storage;

// Application keys living next to the window records in shared storage.
pub const PLAYER_NAME_KEY: &str = "playerName";
pub const CURRENT_ROOM_KEY: &str = "currentRoom";
pub const PLAYER_ID_KEY: &str = "playerId";
pub const SERVER_SESSION_KEY: &str = "serverSessionId";
pub const BOTS_AVAILABLE_KEY: &str = "botsAvailable";

pub fn active_tab_key(window_id: &str) -> String {
    format!("activeTab_{window_id}")
}

pub fn active_user_key(window_id: &str) -> String {
    format!("activeUser_{window_id}")
}

pub fn login_time_key(window_id: &str) -> String {
    format!("loginTime_{window_id}")
}

pub fn force_logout_key(window_id: &str) -> String {
    format!("forceLogout_{window_id}")
}

/// Who holds a window: the tab allowed to act as the logged-in player, the
/// player's name and the last login or heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSessionRecord {
    pub active_tab_id: String,
    pub active_user: String,
    pub login_time: u64,
}

impl WindowSessionRecord {
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.login_time)
    }

    pub fn is_expired(&self, now_ms: u64, ttl: Duration) -> bool {
        self.age_ms(now_ms) >= ttl.as_millis() as u64
    }
}

/// View of one window's record inside the shared store.
pub struct WindowSessionTable<'a, S: Storage + ?Sized> {
    store: &'a S,
    window_id: &'a str,
}

impl<'a, S: Storage + ?Sized> WindowSessionTable<'a, S> {
    pub fn new(store: &'a S, window_id: &'a str) -> Self {
        Self { store, window_id }
    }

    /// The record, if all three fields are present and the login time parses.
    pub fn read(&self) -> Option<WindowSessionRecord> {
        let active_tab_id = self.non_empty(&active_tab_key(self.window_id))?;
        let active_user = self.non_empty(&active_user_key(self.window_id))?;
        let login_time = self
            .non_empty(&login_time_key(self.window_id))?
            .trim()
            .parse()
            .ok()?;
        Some(WindowSessionRecord {
            active_tab_id,
            active_user,
            login_time,
        })
    }

    /// Writes the record with `activeTab` last: a sibling reacting to the
    /// `activeTab` change reads a complete record.
    pub fn write(&self, record: &WindowSessionRecord) {
        self.store
            .set_item(&active_user_key(self.window_id), &record.active_user);
        self.store.set_item(
            &login_time_key(self.window_id),
            &record.login_time.to_string(),
        );
        self.store
            .set_item(&active_tab_key(self.window_id), &record.active_tab_id);
    }

    pub fn touch(&self, now_ms: u64) {
        self.store
            .set_item(&login_time_key(self.window_id), &now_ms.to_string());
    }

    pub fn remove(&self) {
        self.store.remove_item(&active_tab_key(self.window_id));
        self.store.remove_item(&active_user_key(self.window_id));
        self.store.remove_item(&login_time_key(self.window_id));
    }

    pub fn signal_force_logout(&self, now_ms: u64) {
        self.store
            .set_item(&force_logout_key(self.window_id), &now_ms.to_string());
    }

    fn non_empty(&self, key: &str) -> Option<String> {
        self.store.get_item(key).filter(|value| !value.is_empty())
    }
}
