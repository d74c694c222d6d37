mod action;
mod app;
mod core;
mod error;
mod focus;
mod http;
mod intent;
mod mpv;
mod picker;
mod player;
mod provider;
mod session;
mod theme;
mod view;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tv_proto::state::StateStore;

use crate::action::ControllerEvent;
use crate::core::{ControllerConfig, PlaybackController, SystemClock};
use crate::player::{NullPlayer, Player, PlayerEvent};
use crate::provider::{ChannelDataProvider, LineupProvider};
use crate::session::SessionSnapshot;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = tv_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let log_path = data_dir.join("tvbox.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // RUST_LOG wins; otherwise debug for us, quiet for the HTTP stack
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    eprintln!("tvbox log: {}", log_path.display());
    tracing::info!("tvbox starting…");

    // ── Config ───────────────────────────────────────────────────────────────
    let config = tv_proto::config::Config::load().unwrap_or_default();

    // ── Channels ─────────────────────────────────────────────────────────────
    let (event_tx, event_rx) = mpsc::channel::<ControllerEvent>(1024);
    let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());

    // ── Player ───────────────────────────────────────────────────────────────
    let (player_tx, mut player_rx) = mpsc::channel::<PlayerEvent>(64);
    let player: Box<dyn Player> = match mpv::MpvPlayer::start(config.player.clone(), player_tx).await {
        Ok(p) => Box::new(p),
        Err(e) => {
            tracing::warn!("mpv unavailable, continuing without video: {}", e);
            Box::new(NullPlayer)
        }
    };
    let forward_tx = event_tx.clone();
    tokio::spawn(async move {
        while let Some(evt) = player_rx.recv().await {
            if forward_tx.send(ControllerEvent::Player(evt)).await.is_err() {
                break;
            }
        }
    });

    // ── Controller ───────────────────────────────────────────────────────────
    let provider: Arc<dyn ChannelDataProvider> =
        Arc::new(LineupProvider::new(config.lineup.clone()));
    let controller = PlaybackController::new(
        ControllerConfig::from(&config.playback),
        Arc::new(SystemClock),
        Arc::clone(&provider),
        player,
        event_tx.clone(),
        snapshot_tx,
        Some(StateStore::new(config.daemon.state_file.clone())),
    );

    // ── HTTP remote ──────────────────────────────────────────────────────────
    if config.http.enabled {
        http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            http::HttpState {
                event_tx: event_tx.clone(),
                snapshots: snapshot_rx.clone(),
                provider,
            },
        );
    }

    let core = tokio::spawn(async move {
        if let Err(e) = controller.run(event_rx).await {
            tracing::error!("controller exited with error: {}", e);
        }
    });

    // ── Terminal ─────────────────────────────────────────────────────────────
    let result = app::App::new(event_tx.clone(), snapshot_rx).run().await;

    // make sure the player is released even if the terminal loop failed
    let _ = event_tx.send(ControllerEvent::Shutdown).await;
    let _ = core.await;
    tracing::info!("tvbox stopped");
    result
}
