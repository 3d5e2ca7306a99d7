use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

use crate::arbiter::SessionArbiter;
use crate::window_session::WindowSessionTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetireReason {
    SessionMissing,
    UserMismatch { found: String },
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatStatus {
    Refreshed,
    Retired(RetireReason),
}

/// Keeps `user_name`'s hold on the window fresh while this tab is active.
#[derive(Clone)]
pub struct Heartbeat {
    arbiter: SessionArbiter,
    user_name: String,
}

impl Heartbeat {
    pub fn new(arbiter: SessionArbiter, user_name: impl Into<String>) -> Self {
        Self {
            arbiter,
            user_name: user_name.into(),
        }
    }

    /// One beat: refresh `loginTime`, or report why this heartbeat should stop.
    pub fn beat(&self) -> HeartbeatStatus {
        let Some(current) = self.arbiter.check_session() else {
            info!("💔 Window session expired or cleared");
            return HeartbeatStatus::Retired(RetireReason::SessionMissing);
        };

        if current.user != self.user_name {
            info!(
                "🚫 Window session conflict detected. Expected: {} Found: {}",
                self.user_name, current.user
            );
            return HeartbeatStatus::Retired(RetireReason::UserMismatch {
                found: current.user,
            });
        }

        if !current.is_active_tab {
            info!(
                "🚫 This tab is no longer active in window: {}",
                current.window_id
            );
            return HeartbeatStatus::Retired(RetireReason::Superseded);
        }

        WindowSessionTable::new(self.arbiter.shared_store(), &current.window_id)
            .touch(self.arbiter.now_ms());
        HeartbeatStatus::Refreshed
    }
}

/// Running heartbeat task. Stopping or dropping the handle cancels it.
#[must_use = "dropping a HeartbeatHandle stops the heartbeat"]
pub struct HeartbeatHandle {
    task: Option<JoinHandle<RetireReason>>,
}

impl HeartbeatHandle {
    pub fn stop(self) {}

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the heartbeat to retire on its own.
    pub async fn retired(mut self) -> Option<RetireReason> {
        let task = self.task.take()?;
        task.await.ok()
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl SessionArbiter {
    /// Beats every `heartbeat_interval`, first beat one interval from now.
    /// Must be called from inside a tokio runtime.
    pub fn start_session_heartbeat(&self, user_name: &str) -> HeartbeatHandle {
        let heartbeat = Heartbeat::new(self.clone(), user_name);
        let period = self.config.heartbeat_interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let HeartbeatStatus::Retired(reason) = heartbeat.beat() {
                    return reason;
                }
            }
        });

        HeartbeatHandle { task: Some(task) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::{LocalStorage, MemoryStorage, Storage};
    use std::sync::Arc;
    use std::time::Duration;

    fn arbiter(shared: &LocalStorage, clock: &ManualClock) -> SessionArbiter {
        SessionArbiter::new(Arc::new(shared.tab()), Arc::new(MemoryStorage::new()))
            .with_clock(Arc::new(clock.clone()))
    }

    #[test]
    fn beat_refreshes_login_time() {
        let shared = LocalStorage::new();
        let clock = ManualClock::new(1_000);
        let tab = arbiter(&shared, &clock);
        tab.set_session("Ada");
        clock.advance(Duration::from_secs(30));

        assert_eq!(Heartbeat::new(tab.clone(), "Ada").beat(), HeartbeatStatus::Refreshed);
        assert_eq!(tab.check_session().unwrap().login_time, 31_000);
    }

    #[test]
    fn beat_retires_without_session() {
        let shared = LocalStorage::new();
        let clock = ManualClock::new(1_000);
        let tab = arbiter(&shared, &clock);
        assert_eq!(
            Heartbeat::new(tab, "Ada").beat(),
            HeartbeatStatus::Retired(RetireReason::SessionMissing)
        );
    }

    #[test]
    fn beat_retires_on_other_user() {
        let shared = LocalStorage::new();
        let clock = ManualClock::new(1_000);
        let tab = arbiter(&shared, &clock);
        tab.set_session("Grace");
        assert_eq!(
            Heartbeat::new(tab.clone(), "Ada").beat(),
            HeartbeatStatus::Retired(RetireReason::UserMismatch {
                found: "Grace".into()
            })
        );
        assert_eq!(tab.check_session().unwrap().login_time, 1_000);
    }

    #[test]
    fn beat_retires_when_superseded() {
        let shared = LocalStorage::new();
        let clock = ManualClock::new(1_000);
        let first = arbiter(&shared, &clock);
        first.set_session("Ada");

        // same window, different tab
        let second = arbiter(&shared, &clock);
        second
            .tab_store()
            .set_item("windowId", &first.identity().window_id);
        second.set_session("Ada");

        assert_eq!(
            Heartbeat::new(first, "Ada").beat(),
            HeartbeatStatus::Retired(RetireReason::Superseded)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_heartbeat_no_longer_refreshes() {
        let shared = LocalStorage::new();
        let clock = ManualClock::new(1_000);
        let tab = arbiter(&shared, &clock);
        tab.set_session("Ada");

        let handle = tab.start_session_heartbeat("Ada");
        clock.advance(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(tab.check_session().unwrap().login_time, 31_000);

        handle.stop();
        clock.advance(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(tab.check_session().unwrap().login_time, 31_000);
    }
}
