//! Durak Session Demo
//!
//! Drives one relay session from the terminal: creates or joins a room,
//! declares ready and logs everything the session publishes.
//!
//! ```text
//! durak-session create
//! durak-session join <room>
//! ```
//!
//! Relay address and timing come from `DURAK_*` environment variables.

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use durak_session::{RelayConfig, RoomId, SessionNotice, SessionStore, VERSION};

enum Mode {
    Create,
    Join(RoomId),
}

fn parse_args() -> anyhow::Result<Mode> {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("create") => Ok(Mode::Create),
        Some("join") => {
            let raw = args.next().context("usage: durak-session join <room>")?;
            let room = RoomId::parse(raw).context("invalid room id")?;
            Ok(Mode::Join(room))
        }
        _ => bail!("usage: durak-session create | durak-session join <room>"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mode = parse_args()?;
    let config = RelayConfig::from_env();

    info!("Durak Session v{}", VERSION);
    info!("Relay: {}://{}:{}", config.scheme(), config.host, config.port);

    let session = SessionStore::start(config);
    let room = match mode {
        Mode::Create => session.create_room()?,
        Mode::Join(room) => {
            session.join_room(room.clone())?;
            room
        }
    };
    info!("Room: {}", room);
    session.set_ready()?;

    let mut snapshots = session.subscribe();
    let mut notices = session.notices();

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    warn!("Session loop stopped");
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                match serde_json::to_string(&snapshot) {
                    Ok(json) => info!("Snapshot: {}", json),
                    Err(e) => warn!("Could not encode snapshot: {}", e),
                }
            }
            notice = notices.recv() => match notice {
                Ok(SessionNotice::GameOver(result)) => info!("Game over: {}", result),
                Err(e) => warn!("Notice stream: {}", e),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
