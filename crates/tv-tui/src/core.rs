/// PlaybackController: single-owner event loop for the viewing session.
///
/// Every input (remote keys, fetch completions, timers, player events)
/// arrives as a `ControllerEvent` on one mpsc channel, so the session has
/// exactly one writer and needs no locks.  Slow work (stream URL lookups,
/// archive windows, the channel list) runs in spawned tasks that post their
/// result back onto the same channel.
///
/// After each event the controller publishes a `SessionSnapshot` on a
/// `watch` channel for the terminal view and the HTTP API.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use tv_proto::archive::ArchivePolicy;
use tv_proto::config::PlaybackConfig;
use tv_proto::protocol::{Channel, PlayerStatus};
use tv_proto::schedule;
use tv_proto::state::{PersistentState, StateStore};

use crate::action::{ControllerEvent, OverlayCommand, RemoteKey, ResolvedStream};
use crate::error::PlaybackError;
use crate::focus::{EpgOverlay, RewindOverlay};
use crate::intent::IntentTracker;
use crate::picker::TimePicker;
use crate::player::{Player, PlayerEvent};
use crate::provider::ChannelDataProvider;
use crate::session::{OverlayMode, PlaybackSession, RewindOrigin, SessionSnapshot};

const TICK_INTERVAL: Duration = Duration::from_secs(30);

// ── Clock ─────────────────────────────────────────────────────────────────────

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub controls_hide: Duration,
    pub stream_timeout: Duration,
    pub notice: Duration,
    pub archive_policy: ArchivePolicy,
}

impl From<&PlaybackConfig> for ControllerConfig {
    fn from(c: &PlaybackConfig) -> Self {
        Self {
            controls_hide: Duration::from_secs(c.controls_hide_secs),
            stream_timeout: Duration::from_secs(c.stream_timeout_secs),
            notice: Duration::from_secs(c.notice_secs),
            archive_policy: ArchivePolicy::new(c.fallback_archive_hours),
        }
    }
}

/// `(index + delta) mod count`, always in `[0, count)`.  `count` must be > 0.
pub fn wrap_index(index: usize, delta: i64, count: usize) -> usize {
    let n = count as i64;
    (((index as i64 + delta) % n + n) % n) as usize
}

// ── PlaybackController ───────────────────────────────────────────────────────

pub struct PlaybackController {
    config: ControllerConfig,
    clock: Arc<dyn Clock>,
    provider: Arc<dyn ChannelDataProvider>,
    player: Box<dyn Player>,
    /// Our own inbox, cloned into every task that reports back.
    event_tx: mpsc::Sender<ControllerEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    state_store: Option<StateStore>,
    persisted: PersistentState,
    session: PlaybackSession,
    switch: IntentTracker<Option<String>>,
    /// Fetch tasks still running; aborted on exit.
    inflight: Vec<AbortHandle>,
    auto_hide_generation: u64,
    auto_hide_timer: Option<AbortHandle>,
    notice_generation: u64,
    notice_timer: Option<AbortHandle>,
    /// Latest archive-window request; older completions are ignored.
    rewind_seq: u64,
    paused: bool,
    exited: bool,
}

impl PlaybackController {
    pub fn new(
        config: ControllerConfig,
        clock: Arc<dyn Clock>,
        provider: Arc<dyn ChannelDataProvider>,
        player: Box<dyn Player>,
        event_tx: mpsc::Sender<ControllerEvent>,
        snapshot_tx: watch::Sender<SessionSnapshot>,
        state_store: Option<StateStore>,
    ) -> Self {
        Self {
            config,
            clock,
            provider,
            player,
            event_tx,
            snapshot_tx,
            state_store,
            persisted: PersistentState::default(),
            session: PlaybackSession::default(),
            switch: IntentTracker::new(None),
            inflight: Vec::new(),
            auto_hide_generation: 0,
            auto_hide_timer: None,
            notice_generation: 0,
            notice_timer: None,
            rewind_seq: 0,
            paused: false,
            exited: false,
        }
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn is_exited(&self) -> bool {
        self.exited
    }

    /// Restore persisted state and start loading the channel list.
    pub fn init(&mut self) {
        if let Some(store) = &self.state_store {
            self.persisted = store.load();
            debug!("controller: restored state from {}", store.path().display());
        }
        let provider = Arc::clone(&self.provider);
        let tx = self.event_tx.clone();
        self.spawn_tracked(async move {
            let result = provider
                .list_channels()
                .await
                .map_err(PlaybackError::from);
            let _ = tx.send(ControllerEvent::ChannelsLoaded(result)).await;
        });
        self.publish();
    }

    /// Run until the viewer exits, `Shutdown` arrives, or every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<ControllerEvent>) -> anyhow::Result<()> {
        info!("controller: starting event loop");
        self.init();

        let tick_tx = self.event_tx.clone();
        let ticker = tokio::spawn(async move {
            loop {
                tokio::time::sleep(TICK_INTERVAL).await;
                if tick_tx.send(ControllerEvent::Tick).await.is_err() {
                    break;
                }
            }
        });

        while !self.exited {
            match event_rx.recv().await {
                Some(evt) => self.handle_event(evt).await,
                None => {
                    info!("controller: event channel closed, shutting down");
                    break;
                }
            }
        }

        ticker.abort();
        if !self.exited {
            self.dispose().await;
        }
        info!("controller: stopped");
        Ok(())
    }

    /// Cancel timers and fetches and release the player.  Safe to call twice.
    pub async fn dispose(&mut self) {
        self.cancel_auto_hide();
        if let Some(h) = self.notice_timer.take() {
            h.abort();
        }
        for h in self.inflight.drain(..) {
            h.abort();
        }
        self.switch.cancel();
        self.session.switching = false;
        self.rewind_seq += 1;
        self.player.release().await;
        self.exited = true;
        self.publish();
    }

    pub async fn handle_event(&mut self, evt: ControllerEvent) {
        if self.exited {
            debug!("controller: ignoring {:?} after exit", evt);
            return;
        }
        match evt {
            ControllerEvent::Key(key) => self.handle_key(key).await,
            ControllerEvent::ChannelsLoaded(result) => self.on_channels_loaded(result),
            ControllerEvent::StreamResolved {
                seq,
                channel_id,
                at,
                result,
            } => self.on_stream_resolved(seq, channel_id, at, result).await,
            ControllerEvent::ArchiveWindowLoaded {
                seq,
                channel_index,
                origin,
                result,
            } => self.on_archive_window(seq, channel_index, origin, result),
            ControllerEvent::AutoHideElapsed { generation } => {
                if generation == self.auto_hide_generation
                    && self.session.overlay_mode == OverlayMode::Controls
                {
                    self.set_mode(OverlayMode::None);
                } else {
                    debug!("controller: stale auto-hide timer gen={}", generation);
                }
            }
            ControllerEvent::NoticeExpired { generation } => {
                if generation == self.notice_generation {
                    self.session.notice = None;
                }
            }
            ControllerEvent::Player(evt) => self.on_player_event(evt),
            ControllerEvent::Tick => self.refresh_program(),
            ControllerEvent::Shutdown => {
                info!("controller: shutdown requested");
                self.dispose().await;
            }
        }
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx
            .send_replace(self.session.snapshot(self.clock.now()));
    }

    fn spawn_tracked<F>(&mut self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.inflight.retain(|h| !h.is_finished());
        self.inflight.push(tokio::spawn(fut).abort_handle());
    }

    // ── modes ─────────────────────────────────────────────────────────────────

    fn set_mode(&mut self, mode: OverlayMode) {
        let old = self.session.overlay_mode;
        if old == OverlayMode::Controls && mode != OverlayMode::Controls {
            self.cancel_auto_hide();
        }
        match mode {
            OverlayMode::None | OverlayMode::Controls => {
                self.session.epg = None;
                self.session.rewind = None;
                self.session.rewind_origin = None;
            }
            OverlayMode::Epg => {
                self.session.rewind = None;
                self.session.rewind_origin = None;
            }
            OverlayMode::Rewind => {}
        }
        if old != mode {
            info!("controller: {:?} → {:?}", old, mode);
        }
        self.session.overlay_mode = mode;
    }

    fn arm_auto_hide(&mut self) {
        self.cancel_auto_hide();
        let generation = self.auto_hide_generation;
        let delay = self.config.controls_hide;
        let tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ControllerEvent::AutoHideElapsed { generation }).await;
        });
        self.auto_hide_timer = Some(handle.abort_handle());
    }

    /// Abort the running timer and invalidate its generation.
    fn cancel_auto_hide(&mut self) {
        if let Some(h) = self.auto_hide_timer.take() {
            h.abort();
        }
        self.auto_hide_generation += 1;
    }

    fn show_notice(&mut self, text: impl Into<String>) {
        self.session.notice = Some(text.into());
        self.notice_generation += 1;
        if let Some(h) = self.notice_timer.take() {
            h.abort();
        }
        let generation = self.notice_generation;
        let delay = self.config.notice;
        let tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ControllerEvent::NoticeExpired { generation }).await;
        });
        self.notice_timer = Some(handle.abort_handle());
    }

    fn report(&mut self, err: &PlaybackError) {
        match err {
            PlaybackError::StaleResponse { .. } => debug!("controller: {}", err),
            _ => warn!("controller: {}", err),
        }
        if let Some(text) = err.notice() {
            self.show_notice(text);
        }
    }

    // ── keys ──────────────────────────────────────────────────────────────────

    async fn handle_key(&mut self, key: RemoteKey) {
        debug!("controller: key {:?} in {:?}", key, self.session.overlay_mode);
        match self.session.overlay_mode {
            OverlayMode::Rewind => self.handle_rewind_key(key).await,
            OverlayMode::Epg => self.handle_epg_key(key).await,
            OverlayMode::Controls => {
                if key == RemoteKey::Back {
                    self.set_mode(OverlayMode::None);
                } else {
                    self.handle_normal_key(key).await;
                    if self.session.overlay_mode == OverlayMode::Controls {
                        self.arm_auto_hide();
                    }
                }
            }
            OverlayMode::None => self.handle_normal_key(key).await,
        }
    }

    async fn handle_normal_key(&mut self, key: RemoteKey) {
        match key {
            RemoteKey::Up => self.cycle_channel(-1),
            RemoteKey::Down => self.cycle_channel(1),
            RemoteKey::Left | RemoteKey::Right => {
                if self.session.overlay_mode != OverlayMode::Controls {
                    self.set_mode(OverlayMode::Controls);
                    self.arm_auto_hide();
                }
            }
            RemoteKey::Center => self.open_epg(),
            RemoteKey::Back => {
                info!("controller: exit requested");
                self.dispose().await;
            }
            RemoteKey::Rewind => {
                self.request_rewind(self.session.current_channel_index, RewindOrigin::Normal)
            }
            RemoteKey::Favorite => self.toggle_favorite(self.session.current_channel_index).await,
            RemoteKey::PlayPause => self.toggle_pause().await,
        }
    }

    async fn handle_epg_key(&mut self, key: RemoteKey) {
        let session = &mut self.session;
        let Some(epg) = session.epg.as_mut() else {
            self.set_mode(OverlayMode::None);
            return;
        };
        let command = epg.handle_key(key, &session.channels);
        if let Some(cmd) = command {
            self.apply_command(cmd, OverlayMode::Epg).await;
        }
    }

    async fn handle_rewind_key(&mut self, key: RemoteKey) {
        let Some(rewind) = self.session.rewind.as_mut() else {
            self.set_mode(OverlayMode::None);
            return;
        };
        let command = rewind.handle_key(key);
        if let Some(cmd) = command {
            self.apply_command(cmd, OverlayMode::Rewind).await;
        }
    }

    async fn apply_command(&mut self, cmd: OverlayCommand, from: OverlayMode) {
        debug!("controller: overlay command {:?} from {:?}", cmd, from);
        match cmd {
            OverlayCommand::ChannelSelected(index) => {
                self.set_mode(OverlayMode::None);
                self.switch_channel(index, None);
            }
            OverlayCommand::RewindRequested(index) => self.request_rewind(index, RewindOrigin::Epg),
            OverlayCommand::FavoriteToggled(index) => self.toggle_favorite(index).await,
            OverlayCommand::RewindConfirmed(instant) => {
                let Some(index) = self.session.rewind.as_ref().map(|r| r.channel_index()) else {
                    return;
                };
                let at = (instant < self.clock.now()).then_some(instant);
                self.set_mode(OverlayMode::None);
                self.switch_channel(index, at);
            }
            OverlayCommand::Dismissed => match (from, self.session.rewind_origin) {
                (OverlayMode::Rewind, Some(RewindOrigin::Epg)) if self.session.epg.is_some() => {
                    self.set_mode(OverlayMode::Epg)
                }
                _ => self.set_mode(OverlayMode::None),
            },
        }
    }

    fn open_epg(&mut self) {
        self.session.epg = Some(EpgOverlay::open(
            &self.session.channels,
            self.session.current_channel_index,
        ));
        self.set_mode(OverlayMode::Epg);
    }

    // ── channel switching ─────────────────────────────────────────────────────

    fn cycle_channel(&mut self, delta: i64) {
        if !self.session.has_channels() {
            debug!("controller: no channels to cycle");
            return;
        }
        let target = wrap_index(
            self.session.current_channel_index,
            delta,
            self.session.channels.len(),
        );
        self.switch_channel(target, None);
    }

    /// Point the session at `index` and fetch its stream in the background.
    /// Newer switches supersede this one; see `on_stream_resolved`.
    fn switch_channel(&mut self, index: usize, at: Option<DateTime<Local>>) {
        let Some(channel) = self.session.channels.get(index) else {
            warn!("controller: switch to missing channel index {}", index);
            return;
        };
        let channel_id = channel.id.clone();
        info!(
            "controller: switching to {} ({}) at {:?}",
            channel.name, channel_id, at
        );

        self.session.current_channel_index = index;
        let seq = self.switch.begin(Some(channel_id.clone()));
        self.session.switching = true;

        let provider = Arc::clone(&self.provider);
        let tx = self.event_tx.clone();
        let deadline = self.config.stream_timeout;
        let program_instant = at.unwrap_or_else(|| self.clock.now());
        self.spawn_tracked(async move {
            let fetch = resolve_stream(provider.as_ref(), &channel_id, at, program_instant);
            let result = match tokio::time::timeout(deadline, fetch).await {
                Ok(r) => r,
                Err(_) => Err(PlaybackError::Timeout {
                    channel_id: channel_id.clone(),
                }),
            };
            let _ = tx
                .send(ControllerEvent::StreamResolved {
                    seq,
                    channel_id,
                    at,
                    result,
                })
                .await;
        });
    }

    async fn on_stream_resolved(
        &mut self,
        seq: u64,
        channel_id: String,
        at: Option<DateTime<Local>>,
        result: Result<ResolvedStream, PlaybackError>,
    ) {
        let stale = || PlaybackError::StaleResponse {
            channel_id: channel_id.clone(),
        };
        let resolved = match result {
            Ok(resolved) => {
                if let Err(e) = self.switch.confirm(seq, Some(channel_id.clone()), stale) {
                    self.report(&e);
                    return;
                }
                resolved
            }
            Err(err) => {
                if let Err(e) = self.switch.fail(seq, Some(channel_id.clone()), stale) {
                    self.report(&e);
                    return;
                }
                // the previous stream keeps playing, so point back at it
                self.session.switching = false;
                self.restore_confirmed_index();
                self.report(&err);
                return;
            }
        };
        self.session.switching = false;

        if let Err(e) = self.player.load(&resolved.info.uri).await {
            warn!("controller: player failed to load {}: {}", resolved.info.uri, e);
            self.show_notice("Playback failed");
            return;
        }
        if let Err(e) = self.player.play().await {
            warn!("controller: player failed to start: {}", e);
        }
        self.paused = false;
        self.session.player_status = PlayerStatus::Buffering;
        self.session.current_program = resolved.program;
        self.session.archive_position = at;
        info!("controller: playing {} ({})", channel_id, resolved.info.uri);

        if at.is_none() {
            self.remember_channel(channel_id).await;
        }
    }

    fn restore_confirmed_index(&mut self) {
        let Some(confirmed) = self.switch.state().confirmed().as_deref() else {
            return;
        };
        if let Some(index) = self.session.channels.iter().position(|c| c.id == confirmed) {
            self.session.current_channel_index = index;
        }
    }

    async fn remember_channel(&mut self, channel_id: String) {
        let Some(store) = &self.state_store else {
            return;
        };
        if self.persisted.last_channel_id.as_deref() == Some(channel_id.as_str()) {
            return;
        }
        self.persisted.last_channel_id = Some(channel_id);
        if let Err(e) = store.save(&self.persisted).await {
            warn!("controller: failed to save state: {}", e);
        }
    }

    fn on_channels_loaded(&mut self, result: Result<Vec<Channel>, PlaybackError>) {
        match result {
            Ok(channels) => {
                info!("controller: {} channels loaded", channels.len());
                self.session.channels = channels;
                if !self.session.has_channels() {
                    self.session.current_channel_index = 0;
                    return;
                }
                let restored = self.persisted.last_channel_id.as_deref().and_then(|id| {
                    self.session.channels.iter().position(|c| c.id == id)
                });
                self.switch_channel(restored.unwrap_or(0), None);
            }
            Err(e) => self.report(&e),
        }
    }

    // ── rewind ────────────────────────────────────────────────────────────────

    /// Fetch the archive window; the picker opens when it arrives.
    fn request_rewind(&mut self, index: usize, origin: RewindOrigin) {
        let Some(channel) = self.session.channels.get(index) else {
            return;
        };
        self.rewind_seq += 1;
        let seq = self.rewind_seq;
        let channel_id = channel.id.clone();
        let provider = Arc::clone(&self.provider);
        let tx = self.event_tx.clone();
        self.spawn_tracked(async move {
            let result = provider
                .archive_window(&channel_id)
                .await
                .map_err(PlaybackError::from);
            let _ = tx
                .send(ControllerEvent::ArchiveWindowLoaded {
                    seq,
                    channel_index: index,
                    origin,
                    result,
                })
                .await;
        });
    }

    fn on_archive_window(
        &mut self,
        seq: u64,
        channel_index: usize,
        origin: RewindOrigin,
        result: Result<tv_proto::protocol::ArchiveWindow, PlaybackError>,
    ) {
        let still_there = match origin {
            RewindOrigin::Normal => matches!(
                self.session.overlay_mode,
                OverlayMode::None | OverlayMode::Controls
            ),
            RewindOrigin::Epg => self.session.overlay_mode == OverlayMode::Epg,
        };
        if seq != self.rewind_seq || !still_there {
            debug!("controller: dropping archive window seq={} ({:?})", seq, origin);
            return;
        }
        let window = match result {
            Ok(w) => w,
            Err(e) => {
                self.report(&e);
                return;
            }
        };
        let picker = TimePicker::open(window, self.config.archive_policy, self.clock.now());
        if picker.is_empty() {
            self.report(&PlaybackError::EmptyDomain);
        }
        self.session.rewind = Some(RewindOverlay::new(channel_index, picker));
        self.session.rewind_origin = Some(origin);
        self.set_mode(OverlayMode::Rewind);
    }

    // ── misc actions ──────────────────────────────────────────────────────────

    async fn toggle_favorite(&mut self, index: usize) {
        let Some(channel) = self.session.channels.get(index) else {
            return;
        };
        let (id, favorite) = (channel.id.clone(), !channel.favorite);
        info!("controller: favourite {} → {}", id, favorite);
        if let Err(e) = self.provider.set_favorite(&id, favorite).await {
            warn!("controller: provider rejected favourite for {}: {}", id, e);
            self.show_notice("Couldn't update favorites");
            return;
        }
        if let Some(channel) = self.session.channels.get_mut(index) {
            channel.favorite = favorite;
        }
        let session = &mut self.session;
        if let Some(epg) = session.epg.as_mut() {
            epg.refresh(&session.channels);
        }
        self.show_notice(if favorite {
            "Added to favorites"
        } else {
            "Removed from favorites"
        });
    }

    async fn toggle_pause(&mut self) {
        if self.switch.state().confirmed().is_none() {
            return;
        }
        let result = if self.paused {
            self.player.play().await
        } else {
            self.player.pause().await
        };
        match result {
            Ok(()) => {
                self.paused = !self.paused;
                self.session.player_status = if self.paused {
                    PlayerStatus::Paused
                } else {
                    PlayerStatus::Playing
                };
            }
            Err(e) => warn!("controller: play/pause failed: {}", e),
        }
    }

    fn on_player_event(&mut self, evt: PlayerEvent) {
        debug!("controller: player event {:?}", evt);
        match evt {
            PlayerEvent::Buffering => self.session.player_status = PlayerStatus::Buffering,
            PlayerEvent::Ready => {
                self.session.player_status = if self.paused {
                    PlayerStatus::Paused
                } else {
                    PlayerStatus::Playing
                }
            }
            PlayerEvent::Error(msg) => {
                warn!("controller: player error: {}", msg);
                self.session.player_status = PlayerStatus::Error;
                self.show_notice("Playback error");
            }
        }
    }

    /// Keep the live program title current as time passes.
    fn refresh_program(&mut self) {
        if self.session.archive_position.is_some() {
            return;
        }
        let now = self.clock.now();
        self.session.current_program = self
            .session
            .current_channel()
            .and_then(|c| schedule::program_at(&c.programs, now).cloned())
            .or_else(|| self.session.current_program.clone().filter(|p| schedule::is_airing(p, now)));
    }
}

async fn resolve_stream(
    provider: &dyn ChannelDataProvider,
    channel_id: &str,
    at: Option<DateTime<Local>>,
    program_instant: DateTime<Local>,
) -> Result<ResolvedStream, PlaybackError> {
    let info = provider
        .stream_url(channel_id, at)
        .await?
        .ok_or_else(|| PlaybackError::StreamUnplayable {
            channel_id: channel_id.to_string(),
        })?;
    let program = match provider.current_program(channel_id, program_instant).await {
        Ok(p) => p,
        Err(e) => {
            debug!("controller: no program info for {}: {}", channel_id, e);
            None
        }
    };
    Ok(ResolvedStream { info, program })
}
