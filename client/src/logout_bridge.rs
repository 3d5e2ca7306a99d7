use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::arbiter::SessionArbiter;
use crate::storage::{StorageEvent, StorageListener, Subscription};
use crate::tab_identity::TabIdentity;
use crate::window_session::{active_tab_key, force_logout_key};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutReason {
    /// A different player logged in somewhere in this window.
    ForcedLogout,
    /// Another tab of this window became the active one.
    Superseded { active_tab_id: String },
}

/// Maps a shared-storage change to a logout, if it concerns this tab.
pub fn classify(event: &StorageEvent, identity: &TabIdentity) -> Option<LogoutReason> {
    let key = event.key.as_deref()?;
    if key == force_logout_key(&identity.window_id) {
        return Some(LogoutReason::ForcedLogout);
    }
    if key == active_tab_key(&identity.window_id) {
        return match event.new_value.as_deref() {
            Some(active) if !active.is_empty() && active != identity.tab_id => {
                Some(LogoutReason::Superseded {
                    active_tab_id: active.to_string(),
                })
            }
            _ => None,
        };
    }
    None
}

/// Registered logout callback. Dropping it (or calling `unsubscribe`) stops
/// delivery.
#[must_use = "dropping a LogoutListener unsubscribes it"]
pub struct LogoutListener {
    _subscription: Subscription,
}

impl LogoutListener {
    pub fn unsubscribe(self) {}
}

impl SessionArbiter {
    /// Calls `on_force_logout` when another tab pushes this one out of its
    /// window. A takeover touches several keys; the callback still runs at
    /// most once until this tab logs in again.
    pub fn setup_logout_listener<F>(&self, on_force_logout: F) -> LogoutListener
    where
        F: Fn(LogoutReason) + Send + Sync + 'static,
    {
        let identity = self.identity();
        let epoch = self.epoch.clone();
        let fired_in: Mutex<Option<u64>> = Mutex::new(None);

        let listener: StorageListener = Arc::new(move |event: &StorageEvent| {
            let Some(reason) = classify(event, &identity) else {
                return;
            };
            let current = epoch.load(std::sync::atomic::Ordering::SeqCst);
            {
                let mut fired_in = fired_in.lock();
                if *fired_in == Some(current) {
                    return;
                }
                *fired_in = Some(current);
            }
            match &reason {
                LogoutReason::ForcedLogout => {
                    info!(
                        "🚫 Received force logout signal for window: {}",
                        identity.window_id
                    );
                }
                LogoutReason::Superseded { .. } => {
                    info!("🚫 Another tab became active in this window");
                }
            }
            on_force_logout(reason);
        });

        LogoutListener {
            _subscription: self.shared.subscribe(listener),
        }
    }
}
