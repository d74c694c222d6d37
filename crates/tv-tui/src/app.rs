//! Terminal front end: reads keys, forwards them to the controller and
//! redraws whenever a new snapshot is published.

use std::io;
use std::time::Duration;

use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::action::{ControllerEvent, RemoteKey};
use crate::session::SessionSnapshot;
use crate::view;

// the reader checks for shutdown this often
const KEY_POLL: Duration = Duration::from_millis(200);

/// What a terminal key press means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Remote(RemoteKey),
    /// Ctrl-C: stop regardless of overlay state.
    Shutdown,
}

pub fn map_key(key: KeyEvent) -> Option<KeyInput> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(KeyInput::Shutdown);
    }
    let remote = match key.code {
        KeyCode::Up => RemoteKey::Up,
        KeyCode::Down => RemoteKey::Down,
        KeyCode::Left => RemoteKey::Left,
        KeyCode::Right => RemoteKey::Right,
        KeyCode::Enter | KeyCode::Char(' ') => RemoteKey::Center,
        KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('q') => RemoteKey::Back,
        KeyCode::Char('r') => RemoteKey::Rewind,
        KeyCode::Char('f') => RemoteKey::Favorite,
        KeyCode::Char('p') => RemoteKey::PlayPause,
        _ => return None,
    };
    Some(KeyInput::Remote(remote))
}

pub struct App {
    event_tx: mpsc::Sender<ControllerEvent>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl App {
    pub fn new(
        event_tx: mpsc::Sender<ControllerEvent>,
        snapshots: watch::Receiver<SessionSnapshot>,
    ) -> Self {
        Self { event_tx, snapshots }
    }

    /// Runs until the controller stops publishing snapshots.
    pub async fn run(mut self) -> anyhow::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        debug!("app: terminal created, size={:?}", terminal.size());

        let (key_tx, mut key_rx) = mpsc::channel::<KeyInput>(64);
        tokio::task::spawn_blocking(move || {
            while !key_tx.is_closed() {
                match event::poll(KEY_POLL) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(_) => break,
                }
                match event::read() {
                    Ok(Event::Key(key)) => {
                        if let Some(input) = map_key(key) {
                            if key_tx.blocking_send(input).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        });

        let result = self.event_loop(&mut terminal, &mut key_rx).await;

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        result
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        key_rx: &mut mpsc::Receiver<KeyInput>,
    ) -> anyhow::Result<()> {
        loop {
            {
                let snap = self.snapshots.borrow_and_update();
                terminal.draw(|f| view::draw(f, &snap))?;
            }

            tokio::select! {
                changed = self.snapshots.changed() => {
                    if changed.is_err() {
                        info!("app: controller stopped");
                        break;
                    }
                }
                Some(input) = key_rx.recv() => {
                    let evt = match input {
                        KeyInput::Remote(key) => ControllerEvent::Key(key),
                        KeyInput::Shutdown => ControllerEvent::Shutdown,
                    };
                    if self.event_tx.send(evt).await.is_err() {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
