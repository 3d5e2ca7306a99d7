pub mod api;
pub mod arbiter;
pub mod clock;
pub mod config;
pub mod connection;
pub mod file_storage;
pub mod heartbeat;
pub mod login;
pub mod logout_bridge;
pub mod storage;
pub mod tab_identity;
pub mod window_session;

pub mod prelude {
    pub use crate::api::{ApiClient, ApiError, NameCheck, ServerStats};
    pub use crate::arbiter::{SessionArbiter, SessionInfo};
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::{ClientConfig, SessionConfig};
    pub use crate::connection::{ClientAction, Connection};
    pub use crate::file_storage::{FileStorage, WatchHandle};
    pub use crate::heartbeat::{Heartbeat, HeartbeatHandle, HeartbeatStatus, RetireReason};
    pub use crate::login::{
        complete_login, enter_login_page, login_conflict, resume_player, validate_player_name,
        LoginConflict, LoginPage, NameError, PageAccess, RedirectReason,
    };
    pub use crate::logout_bridge::{LogoutListener, LogoutReason};
    pub use crate::storage::{
        LocalStorage, MemoryStorage, SharedStorage, Storage, StorageEvent, StorageListener,
        Subscription,
    };
    pub use crate::tab_identity::TabIdentity;
}

pub use prelude::*;
