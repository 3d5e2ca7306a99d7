use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use bridges_client::prelude::*;
use bridges_client::window_session::{CURRENT_ROOM_KEY, PLAYER_NAME_KEY};
use clap::{Parser, Subcommand};
use serde_json::json;
use shared::CurrentRoom;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "bol-session",
    about = "Inspect and drive Bridges of Life window sessions from the terminal"
)]
struct Cli {
    /// Directory holding the shared store (local.json) and per-tab stores
    #[arg(long, env = "BOL_STORE_DIR", default_value = ".bol-store")]
    store_dir: PathBuf,

    /// Name of the per-tab store; two names sharing a window id act as
    /// duplicated tabs
    #[arg(long, env = "BOL_TAB", default_value = "tab-1")]
    tab: String,

    /// Game server base URL (falls back to BOL_PRODUCTION / localhost)
    #[arg(long, env = "BOL_SERVER_URL")]
    server_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show this tab's ids and the window session it sees
    Status,
    /// Log in as NAME, taking over the window
    Login {
        name: String,
        /// Take over without asking when someone else holds the window
        #[arg(long)]
        yes: bool,
        /// Skip the server name check
        #[arg(long)]
        offline: bool,
    },
    /// Log out of this window
    Logout,
    /// Check whether this tab may enter the lobby or a game page
    Resume,
    /// Keep NAME's session alive until the tab is superseded or ctrl-c
    Heartbeat { name: String },
    /// Wait for another tab to push this one out
    Watch,
    /// Forget this window's session; --full also wipes both stores
    Reset {
        #[arg(long)]
        full: bool,
    },
    /// Ask the server to drop all rooms and players
    ServerReset,
    /// Print server statistics
    Stats,
    /// List rooms and players known to the server
    Rooms,
}

struct Tab {
    arbiter: SessionArbiter,
    shared: Arc<FileStorage>,
}

impl Tab {
    fn open(cli: &Cli, config: &ClientConfig) -> Self {
        let shared = Arc::new(FileStorage::open(cli.store_dir.join("local.json")));
        let tab_store = FileStorage::open(
            cli.store_dir
                .join("tabs")
                .join(format!("{}.json", cli.tab)),
        );
        let arbiter = SessionArbiter::new(shared.clone(), Arc::new(tab_store))
            .with_config(config.session);
        Self { arbiter, shared }
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env();
    if let Some(url) = &cli.server_url {
        config = config.with_server_url(url.trim_end_matches('/'));
    }
    let api = ApiClient::new(config.server_url.clone());
    let tab = Tab::open(&cli, &config);
    let arbiter = &tab.arbiter;

    match cli.command {
        Commands::Status => {
            let shared = arbiter.shared_store();
            let room = shared
                .get_item(CURRENT_ROOM_KEY)
                .and_then(|raw| CurrentRoom::from_json(&raw));
            print_json(&json!({
                "identity": arbiter.identity(),
                "session": arbiter.check_session(),
                "playerName": arbiter.tab_store().get_item(PLAYER_NAME_KEY)
                    .or_else(|| shared.get_item(PLAYER_NAME_KEY)),
                "currentRoom": room,
            }))?;
        }
        Commands::Login { name, yes, offline } => {
            let name = validate_player_name(&name)?;

            if !offline {
                let check = api.check_name(&name).await;
                if !check.available {
                    bail!(
                        "❌ {}",
                        check
                            .message
                            .unwrap_or_else(|| "Name is already in use".to_string())
                    );
                }
            }

            if let Some(conflict) = login_conflict(arbiter, &name) {
                if !yes {
                    bail!("{} (rerun with --yes to confirm)", conflict.prompt(&name));
                }
                warn!("{}", conflict.prompt(&name));
            }

            complete_login(arbiter, &name);
            print_json(&arbiter.check_session())?;
        }
        Commands::Logout => {
            let page = enter_login_page(arbiter, Some(RedirectReason::Logout));
            if let Some(notice) = page.notice {
                println!("{notice}");
            }
            info!("👋 Logged out of window {}", arbiter.identity().window_id);
        }
        Commands::Resume => match Connection::new(arbiter.clone()).enter_lobby() {
            Ok(join) => {
                let (event, data) = join.to_frame();
                info!("✅ Session resumed, emitting {}", event);
                print_json(&json!({ "event": event, "data": data }))?;
            }
            Err(path) => bail!("🚫 No usable session, redirect to {path}"),
        },
        Commands::Heartbeat { name } => {
            let Some(session) = arbiter.check_session() else {
                bail!("No window session; log in first");
            };
            if session.user != name || !session.is_active_tab {
                bail!(
                    "This tab is not the active tab for {} (window held by {})",
                    name,
                    session.user
                );
            }

            let _watch = tab.shared.watch(config.watch_interval);
            let handle = arbiter.start_session_heartbeat(&name);
            info!(
                "💓 Heartbeat every {:?} for {}",
                arbiter.config().heartbeat_interval,
                name
            );
            tokio::select! {
                reason = handle.retired() => {
                    println!("Heartbeat stopped: {reason:?}");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("🛑 Interrupted");
                }
            }
        }
        Commands::Watch => {
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let _listener = arbiter.setup_logout_listener(move |reason| {
                let _ = tx.send(reason);
            });
            let _watch = tab.shared.watch(config.watch_interval);
            info!(
                "👀 Watching window {} for logout signals",
                arbiter.identity().window_id
            );
            tokio::select! {
                Some(reason) = rx.recv() => {
                    println!("Logged out: {reason:?}");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("🛑 Interrupted");
                }
            }
        }
        Commands::Reset { full } => {
            if full {
                arbiter.hard_reset();
            } else {
                enter_login_page(arbiter, Some(RedirectReason::Reset));
            }
        }
        Commands::ServerReset => {
            api.reset_server().await?;
            println!("✅ Server reset successfully! All rooms and players cleared.");
        }
        Commands::Stats => {
            let stats = api.stats().await?;
            println!("{}", stats.summary());
        }
        Commands::Rooms => {
            let rooms = api.debug_rooms().await?;
            let room_lines = rooms.room_lines();
            let players = rooms.player_names();
            println!(
                "🏠 Current Rooms ({}): {}",
                room_lines.len(),
                if room_lines.is_empty() { "None".to_string() } else { room_lines.join(", ") }
            );
            println!(
                "👥 Current Players ({}): {}",
                players.len(),
                if players.is_empty() { "None".to_string() } else { players.join(", ") }
            );
        }
    }

    Ok(())
}
