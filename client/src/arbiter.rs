//! One active identity per browser window.
//!
//! Every tab of a window can read the window's record in shared storage, but
//! only the tab whose id is stored as `activeTab_{window}` acts as the logged
//! in player. Any tab may take the window over; the previous holder learns
//! about it through the logout listener or on its next `check_session`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::storage::{SharedStorage, Storage};
use crate::tab_identity::TabIdentity;
use crate::window_session::{
    WindowSessionRecord, WindowSessionTable, CURRENT_ROOM_KEY, PLAYER_NAME_KEY,
};

/// What `check_session` knows about the window this tab belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub user: String,
    pub login_time: u64,
    pub is_active_tab: bool,
    pub window_id: String,
    pub tab_id: String,
    /// Only set when another tab holds the window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_tab_id: Option<String>,
}

#[derive(Clone)]
pub struct SessionArbiter {
    pub(crate) shared: Arc<dyn SharedStorage>,
    pub(crate) tab: Arc<dyn Storage>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: SessionConfig,
    // bumped on every login from this tab; listeners fire once per epoch
    pub(crate) epoch: Arc<AtomicU64>,
}

impl SessionArbiter {
    pub fn new(shared: Arc<dyn SharedStorage>, tab: Arc<dyn Storage>) -> Self {
        Self {
            shared,
            tab,
            clock: Arc::new(SystemClock),
            config: SessionConfig::default(),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn identity(&self) -> TabIdentity {
        TabIdentity::load_or_create(self.tab.as_ref(), self.clock.as_ref())
    }

    pub fn shared_store(&self) -> &dyn SharedStorage {
        self.shared.as_ref()
    }

    pub fn tab_store(&self) -> &dyn Storage {
        self.tab.as_ref()
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Reads this window's record. Expired records are cleared on the way out.
    pub fn check_session(&self) -> Option<SessionInfo> {
        let identity = self.identity();
        let record = WindowSessionTable::new(self.shared.as_ref(), &identity.window_id).read()?;

        if record.is_expired(self.now_ms(), self.config.ttl) {
            info!(
                "⌛ Window session for {} expired (window {})",
                record.active_user, identity.window_id
            );
            self.clear_session();
            return None;
        }

        let is_active_tab = record.active_tab_id == identity.tab_id;
        debug!(
            "🔎 Window {} held by {} (this tab active: {})",
            identity.window_id, record.active_user, is_active_tab
        );
        Some(SessionInfo {
            user: record.active_user,
            login_time: record.login_time,
            is_active_tab,
            window_id: identity.window_id,
            tab_id: identity.tab_id,
            active_tab_id: (!is_active_tab).then_some(record.active_tab_id),
        })
    }

    /// Makes this tab the active one for its window, unconditionally.
    pub fn set_session(&self, user_name: &str) {
        let identity = self.identity();
        let record = WindowSessionRecord {
            active_tab_id: identity.tab_id.clone(),
            active_user: user_name.to_string(),
            login_time: self.now_ms(),
        };
        self.epoch.fetch_add(1, Ordering::SeqCst);
        WindowSessionTable::new(self.shared.as_ref(), &identity.window_id).write(&record);
        info!(
            "🔐 Window session set for: {} Window: {} Tab: {}",
            user_name, identity.window_id, identity.tab_id
        );
    }

    /// Drops the window record and the cached player/room state. The tab and
    /// window ids themselves are kept.
    pub fn clear_session(&self) {
        let identity = self.identity();
        WindowSessionTable::new(self.shared.as_ref(), &identity.window_id).remove();
        self.shared.remove_item(PLAYER_NAME_KEY);
        self.shared.remove_item(CURRENT_ROOM_KEY);
        self.tab.remove_item(PLAYER_NAME_KEY);
        info!("🔓 Window session cleared for window: {}", identity.window_id);
    }

    /// Takes the window over for `new_user_name`. A different player holding
    /// the window is signalled to log out first.
    pub fn force_logout_other_tabs(&self, new_user_name: &str) {
        if let Some(current) = self.check_session() {
            if current.user != new_user_name {
                info!(
                    "🚫 Forcing logout of previous user in this window: {}",
                    current.user
                );
                WindowSessionTable::new(self.shared.as_ref(), &current.window_id)
                    .signal_force_logout(self.now_ms());
                self.clear_session();
            }
        }
        self.set_session(new_user_name);
    }

    /// Wipes both stores, ids included. The next access mints a new identity.
    pub fn hard_reset(&self) {
        self.shared.clear();
        self.tab.clear();
        info!("🧹 All browser storage cleared");
    }

    pub(crate) fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::{LocalStorage, MemoryStorage};
    use crate::tab_identity::{TAB_ID_KEY, WINDOW_ID_KEY};
    use std::time::Duration;

    fn arbiter(shared: &LocalStorage, clock: &ManualClock) -> SessionArbiter {
        SessionArbiter::new(Arc::new(shared.tab()), Arc::new(MemoryStorage::new()))
            .with_clock(Arc::new(clock.clone()))
    }

    #[test]
    fn no_record_means_no_session() {
        let shared = LocalStorage::new();
        let clock = ManualClock::new(1_000);
        assert_eq!(arbiter(&shared, &clock).check_session(), None);
    }

    #[test]
    fn set_then_check_is_active() {
        let shared = LocalStorage::new();
        let clock = ManualClock::new(1_000);
        let tab = arbiter(&shared, &clock);

        tab.set_session("Ada");
        let info = tab.check_session().unwrap();

        assert_eq!(info.user, "Ada");
        assert!(info.is_active_tab);
        assert_eq!(info.login_time, 1_000);
        assert_eq!(info.active_tab_id, None);
        assert_eq!(info.tab_id, tab.identity().tab_id);
    }

    #[test]
    fn clear_keeps_ids_and_drops_player_state() {
        let shared = LocalStorage::new();
        let clock = ManualClock::new(1_000);
        let tab = arbiter(&shared, &clock);
        let identity = tab.identity();
        tab.set_session("Ada");
        shared.set_item(PLAYER_NAME_KEY, "Ada");
        shared.set_item(CURRENT_ROOM_KEY, "{}");
        tab.tab_store().set_item(PLAYER_NAME_KEY, "Ada");
        shared.set_item("serverSessionId", "s1");

        tab.clear_session();

        assert_eq!(tab.check_session(), None);
        assert_eq!(shared.get_item(PLAYER_NAME_KEY), None);
        assert_eq!(shared.get_item(CURRENT_ROOM_KEY), None);
        assert_eq!(tab.tab_store().get_item(PLAYER_NAME_KEY), None);
        assert_eq!(shared.get_item("serverSessionId").as_deref(), Some("s1"));
        assert_eq!(tab.identity(), identity);
    }

    #[test]
    fn expired_record_is_cleared_on_read() {
        let shared = LocalStorage::new();
        let clock = ManualClock::new(10_000_000);
        let tab = arbiter(&shared, &clock);
        tab.set_session("Ada");

        clock.advance(Duration::from_millis(3_600_001));

        assert_eq!(tab.check_session(), None);
        assert!(shared.keys().is_empty());
    }

    #[test]
    fn same_user_takeover_sends_no_signal() {
        let shared = LocalStorage::new();
        let clock = ManualClock::new(1_000);
        let tab = arbiter(&shared, &clock);
        tab.set_session("Ada");

        tab.force_logout_other_tabs("Ada");

        let window_id = tab.identity().window_id;
        assert_eq!(shared.get_item(&format!("forceLogout_{window_id}")), None);
        assert!(tab.check_session().unwrap().is_active_tab);
    }

    #[test]
    fn different_user_takeover_signals_the_window() {
        let shared = LocalStorage::new();
        let clock = ManualClock::new(1_000);
        let tab = arbiter(&shared, &clock);
        tab.set_session("Ada");
        clock.advance(Duration::from_secs(1));

        tab.force_logout_other_tabs("Grace");

        let window_id = tab.identity().window_id;
        assert_eq!(
            shared.get_item(&format!("forceLogout_{window_id}")).as_deref(),
            Some("2000")
        );
        let info = tab.check_session().unwrap();
        assert_eq!(info.user, "Grace");
        assert!(info.is_active_tab);
    }

    #[test]
    fn hard_reset_mints_new_ids() {
        let shared = LocalStorage::new();
        let clock = ManualClock::new(1_000);
        let tab = arbiter(&shared, &clock);
        let before = tab.identity();
        tab.set_session("Ada");

        tab.hard_reset();

        assert_eq!(tab.tab_store().get_item(WINDOW_ID_KEY), None);
        assert_eq!(tab.tab_store().get_item(TAB_ID_KEY), None);
        assert_eq!(tab.check_session(), None);
        assert_ne!(tab.identity(), before);
    }
}
