use rand::Rng;
use serde::Serialize;

use crate::clock::Clock;
use crate::storage::Storage;

pub const WINDOW_ID_KEY: &str = "windowId";
pub const TAB_ID_KEY: &str = "tabId";

const SUFFIX_LEN: usize = 9;

/// The pair of ids a tab keeps in its own storage. Both are minted on first
/// access and survive reloads of that tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabIdentity {
    pub window_id: String,
    pub tab_id: String,
}

impl TabIdentity {
    pub fn load_or_create(tab_store: &dyn Storage, clock: &dyn Clock) -> Self {
        Self {
            window_id: window_id(tab_store, clock),
            tab_id: tab_id(tab_store, clock),
        }
    }

    /// Id presented to the game server when the socket connects.
    pub fn browser_session_id(&self) -> String {
        format!("{}_{}", self.window_id, self.tab_id)
    }
}

pub fn window_id(tab_store: &dyn Storage, clock: &dyn Clock) -> String {
    get_or_mint(tab_store, WINDOW_ID_KEY, "window", clock)
}

pub fn tab_id(tab_store: &dyn Storage, clock: &dyn Clock) -> String {
    get_or_mint(tab_store, TAB_ID_KEY, "tab", clock)
}

fn get_or_mint(tab_store: &dyn Storage, key: &str, prefix: &str, clock: &dyn Clock) -> String {
    if let Some(existing) = tab_store.get_item(key).filter(|id| !id.is_empty()) {
        return existing;
    }
    let id = format!("{prefix}_{}_{}", clock.now_ms(), random_suffix());
    tab_store.set_item(key, &id);
    id
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| char::from_digit(rng.gen_range(0..36), 36).unwrap_or('0'))
        .collect()
}
