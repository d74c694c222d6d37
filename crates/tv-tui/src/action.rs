//! Remote keys, overlay commands and every input into the controller loop.

use chrono::{DateTime, Local};
use tv_proto::protocol::{ArchiveWindow, Channel, Program, StreamInfo};

use crate::error::PlaybackError;
use crate::player::PlayerEvent;
use crate::session::RewindOrigin;

/// Logical remote-control keys.  Terminal keys and HTTP key names both map
/// onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteKey {
    Up,
    Down,
    Left,
    Right,
    Center,
    Back,
    Rewind,
    Favorite,
    PlayPause,
}

impl RemoteKey {
    pub fn from_name(name: &str) -> Option<Self> {
        let key = match name.to_ascii_lowercase().as_str() {
            "up" => RemoteKey::Up,
            "down" => RemoteKey::Down,
            "left" => RemoteKey::Left,
            "right" => RemoteKey::Right,
            "center" | "enter" | "ok" => RemoteKey::Center,
            "back" => RemoteKey::Back,
            "rewind" => RemoteKey::Rewind,
            "favorite" | "favourite" => RemoteKey::Favorite,
            "playpause" | "play_pause" => RemoteKey::PlayPause,
            _ => return None,
        };
        Some(key)
    }

    pub fn is_vertical(self) -> bool {
        matches!(self, RemoteKey::Up | RemoteKey::Down)
    }
}

/// What an overlay asks the controller to do.  Overlays never touch the
/// session or the player themselves.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayCommand {
    /// Switch to this index of the full channel list.
    ChannelSelected(usize),
    RewindConfirmed(DateTime<Local>),
    /// Open the rewind picker for this index of the full channel list.
    RewindRequested(usize),
    /// Toggle the favourite flag of this index of the full channel list.
    FavoriteToggled(usize),
    Dismissed,
}

/// A stream URL together with the program airing at the requested instant.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStream {
    pub info: StreamInfo,
    pub program: Option<Program>,
}

/// All inputs into the controller loop.
#[derive(Debug)]
pub enum ControllerEvent {
    Key(RemoteKey),
    ChannelsLoaded(Result<Vec<Channel>, PlaybackError>),
    /// Completion of a channel-switch fetch tagged with its request.
    StreamResolved {
        seq: u64,
        channel_id: String,
        at: Option<DateTime<Local>>,
        result: Result<ResolvedStream, PlaybackError>,
    },
    /// Completion of the archive-window fetch that precedes the rewind picker.
    ArchiveWindowLoaded {
        seq: u64,
        channel_index: usize,
        origin: RewindOrigin,
        result: Result<ArchiveWindow, PlaybackError>,
    },
    AutoHideElapsed { generation: u64 },
    NoticeExpired { generation: u64 },
    Player(PlayerEvent),
    /// Periodic refresh of the airing program.
    Tick,
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names() {
        assert_eq!(RemoteKey::from_name("UP"), Some(RemoteKey::Up));
        assert_eq!(RemoteKey::from_name("ok"), Some(RemoteKey::Center));
        assert_eq!(RemoteKey::from_name("playpause"), Some(RemoteKey::PlayPause));
        assert_eq!(RemoteKey::from_name("volume"), None);
    }
}
