//! Login page and page-entry checks built on the arbiter.

use thiserror::Error;
use tracing::info;

use crate::arbiter::SessionArbiter;
use crate::storage::Storage;
use crate::window_session::{PLAYER_NAME_KEY, SERVER_SESSION_KEY};

pub const MIN_NAME_LEN: usize = 2;
pub const MAX_NAME_LEN: usize = 20;

pub const LOGIN_PATH: &str = "/";
pub const LOBBY_PATH: &str = "/lobby";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("Please enter your name")]
    Empty,
    #[error("Name must be at least 2 characters long")]
    TooShort,
    #[error("Name must be at most 20 characters long")]
    TooLong,
}

pub fn validate_player_name(raw: &str) -> Result<String, NameError> {
    let name = raw.trim();
    let len = name.chars().count();
    if len == 0 {
        Err(NameError::Empty)
    } else if len < MIN_NAME_LEN {
        Err(NameError::TooShort)
    } else if len > MAX_NAME_LEN {
        Err(NameError::TooLong)
    } else {
        Ok(name.to_string())
    }
}

/// Why the client was sent back to the login page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    Logout,
    Restart,
    NameConflict,
    Reset,
}

impl RedirectReason {
    const ALL: [RedirectReason; 4] = [
        RedirectReason::Logout,
        RedirectReason::Restart,
        RedirectReason::NameConflict,
        RedirectReason::Reset,
    ];

    pub fn flag(self) -> &'static str {
        match self {
            RedirectReason::Logout => "logout",
            RedirectReason::Restart => "restart",
            RedirectReason::NameConflict => "name-conflict",
            RedirectReason::Reset => "reset",
        }
    }

    /// Picks the first `flag=true` pair out of a query string such as
    /// `?logout=true`.
    pub fn from_query(query: &str) -> Option<Self> {
        let query = query.trim_start_matches('?');
        query.split('&').find_map(|pair| {
            let (flag, value) = pair.split_once('=')?;
            if value != "true" {
                return None;
            }
            Self::ALL.into_iter().find(|reason| reason.flag() == flag)
        })
    }

    pub fn login_path(self) -> String {
        format!("{LOGIN_PATH}?{}=true", self.flag())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginPage {
    pub notice: Option<String>,
}

/// Applies the redirect flags the login page was opened with and reports
/// whether another tab of this window already holds it.
pub fn enter_login_page(arbiter: &SessionArbiter, reason: Option<RedirectReason>) -> LoginPage {
    let mut notice = None;
    match reason {
        Some(RedirectReason::Logout) | Some(RedirectReason::Restart) => {
            arbiter.clear_session();
            arbiter.shared_store().remove_item(SERVER_SESSION_KEY);
        }
        Some(RedirectReason::NameConflict) => {
            notice = Some("❌ Your name was already in use. Please choose a different name.".into());
            arbiter.clear_session();
        }
        Some(RedirectReason::Reset) => {
            notice = Some("🔄 Server has been reset. All data cleared. Please login again.".into());
            arbiter.clear_session();
        }
        None => {}
    }

    if let Some(current) = arbiter.check_session() {
        if !current.is_active_tab {
            notice = Some(format!(
                "⚠️ {} is already active in another tab of this window. Only one tab per window can be active.",
                current.user
            ));
        }
    }

    LoginPage { notice }
}

/// A login that would push someone out and so needs the player's consent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginConflict {
    OtherTabActive { user: String },
    SwitchUser { current: String },
}

impl LoginConflict {
    pub fn prompt(&self, new_name: &str) -> String {
        match self {
            LoginConflict::OtherTabActive { user } => format!(
                "{user} is already active in another tab of this window. \
                 Do you want to take over as the active tab and login as {new_name}?"
            ),
            LoginConflict::SwitchUser { current } => format!(
                "You are currently logged in as {current}. \
                 Do you want to logout and login as {new_name}?"
            ),
        }
    }
}

pub fn login_conflict(arbiter: &SessionArbiter, name: &str) -> Option<LoginConflict> {
    let current = arbiter.check_session()?;
    if !current.is_active_tab {
        Some(LoginConflict::OtherTabActive { user: current.user })
    } else if current.user != name {
        Some(LoginConflict::SwitchUser {
            current: current.user,
        })
    } else {
        None
    }
}

/// Takes the window for `name` and remembers the name in both stores.
pub fn complete_login(arbiter: &SessionArbiter, name: &str) {
    arbiter.force_logout_other_tabs(name);
    arbiter.tab_store().set_item(PLAYER_NAME_KEY, name);
    arbiter.shared_store().set_item(PLAYER_NAME_KEY, name);
    info!("🎮 {} logged in", name);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAccess {
    Granted { player_name: String },
    Redirect(String),
}

/// Entry check for the lobby and game pages.
pub fn resume_player(arbiter: &SessionArbiter) -> PageAccess {
    let Some(current) = arbiter.check_session() else {
        return PageAccess::Redirect(LOGIN_PATH.to_string());
    };

    let stored = arbiter
        .tab_store()
        .get_item(PLAYER_NAME_KEY)
        .or_else(|| arbiter.shared_store().get_item(PLAYER_NAME_KEY))
        .filter(|name| !name.is_empty());
    let Some(player_name) = stored else {
        return PageAccess::Redirect(LOGIN_PATH.to_string());
    };

    if current.user != player_name {
        info!(
            "🚫 Session mismatch. Browser session: {} Stored name: {}",
            current.user, player_name
        );
        return PageAccess::Redirect(LOGIN_PATH.to_string());
    }

    arbiter.tab_store().set_item(PLAYER_NAME_KEY, &player_name);
    PageAccess::Granted { player_name }
}
