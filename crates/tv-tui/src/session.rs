//! Playback session state and the read-only snapshot published to the
//! terminal view and the HTTP API.

use chrono::{DateTime, Local};
use serde::Serialize;
use tv_proto::protocol::{Channel, PlayerStatus, Program};
use tv_proto::schedule;

use crate::focus::{EpgFocus, EpgOverlay, RewindFocus, RewindOverlay};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayMode {
    #[default]
    None,
    Controls,
    Epg,
    Rewind,
}

/// Where the rewind picker was opened from; Back returns there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewindOrigin {
    Normal,
    Epg,
}

/// Everything the controller owns about the viewing session.  Only the
/// controller writes to it.
#[derive(Debug, Default)]
pub struct PlaybackSession {
    pub channels: Vec<Channel>,
    /// Meaningless while `channels` is empty.
    pub current_channel_index: usize,
    pub overlay_mode: OverlayMode,
    pub epg: Option<EpgOverlay>,
    pub rewind: Option<RewindOverlay>,
    pub rewind_origin: Option<RewindOrigin>,
    /// Set while playing from the archive; cleared by any live switch.
    pub archive_position: Option<DateTime<Local>>,
    pub current_program: Option<Program>,
    pub player_status: PlayerStatus,
    pub notice: Option<String>,
    pub switching: bool,
}

impl PlaybackSession {
    pub fn current_channel(&self) -> Option<&Channel> {
        self.channels.get(self.current_channel_index)
    }

    pub fn has_channels(&self) -> bool {
        !self.channels.is_empty()
    }

    pub fn snapshot(&self, now: DateTime<Local>) -> SessionSnapshot {
        let summary = |index: usize, c: &Channel| ChannelSummary {
            index,
            number: c.number,
            name: c.name.clone(),
            category: c.category.clone(),
            is_hd: c.is_hd,
            favorite: c.favorite,
            now_playing: schedule::program_at(&c.programs, now).map(|p| p.title().to_string()),
        };

        let epg = self.epg.as_ref().map(|epg| EpgSnapshot {
            categories: epg.categories().iter().map(|c| c.label().to_string()).collect(),
            category_index: epg.category_index(),
            focus: epg.focus(),
            rows: epg
                .filtered()
                .iter()
                .filter_map(|&i| self.channels.get(i).map(|c| summary(i, c)))
                .collect(),
            selected: epg.selected(),
        });

        let rewind = self.rewind.as_ref().map(|r| {
            let picker = r.picker();
            let selection = picker.selection();
            RewindSnapshot {
                channel_name: self
                    .channels
                    .get(r.channel_index())
                    .map(|c| c.name.clone())
                    .unwrap_or_default(),
                days: picker.domain().iter().map(|d| d.label.clone()).collect(),
                day_index: selection.map(|s| s.day_index),
                hour: selection.map(|s| s.hour),
                minute: selection.map(|s| s.minute),
                focus: r.focus(),
                instant: r.displayed_instant(),
                out_of_range: r.is_out_of_range(),
                empty: picker.is_empty(),
            }
        });

        let program = self.current_program.as_ref().map(|p| {
            // progress is measured against the instant being watched
            let at = self.archive_position.unwrap_or(now);
            ProgramSummary {
                title: p.title().to_string(),
                description: p.description().to_string(),
                start: p.start(),
                end: p.end(),
                progress: schedule::progress(p, at),
                duration_minutes: schedule::duration_minutes(p),
            }
        });

        SessionSnapshot {
            mode: self.overlay_mode,
            channel_count: self.channels.len(),
            current_channel_index: self.has_channels().then_some(self.current_channel_index),
            channel: self
                .current_channel()
                .map(|c| summary(self.current_channel_index, c)),
            program,
            archive_position: self.archive_position,
            player_status: self.player_status.clone(),
            switching: self.switching,
            notice: self.notice.clone(),
            epg,
            rewind,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChannelSummary {
    pub index: usize,
    pub number: u32,
    pub name: String,
    pub category: String,
    pub is_hd: bool,
    pub favorite: bool,
    pub now_playing: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProgramSummary {
    pub title: String,
    pub description: String,
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub progress: f64,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EpgSnapshot {
    pub categories: Vec<String>,
    pub category_index: usize,
    pub focus: EpgFocus,
    pub rows: Vec<ChannelSummary>,
    pub selected: Option<usize>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RewindSnapshot {
    pub channel_name: String,
    pub days: Vec<String>,
    pub day_index: Option<usize>,
    pub hour: Option<usize>,
    pub minute: Option<usize>,
    pub focus: RewindFocus,
    pub instant: Option<DateTime<Local>>,
    pub out_of_range: bool,
    pub empty: bool,
}

/// Read-only view of the session.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct SessionSnapshot {
    pub mode: OverlayMode,
    pub channel_count: usize,
    pub current_channel_index: Option<usize>,
    pub channel: Option<ChannelSummary>,
    pub program: Option<ProgramSummary>,
    pub archive_position: Option<DateTime<Local>>,
    pub player_status: PlayerStatus,
    pub switching: bool,
    pub notice: Option<String>,
    pub epg: Option<EpgSnapshot>,
    pub rewind: Option<RewindSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_snapshot_of_empty_session() {
        let snap = PlaybackSession::default().snapshot(Local::now());
        assert_eq!(snap.mode, OverlayMode::None);
        assert_eq!(snap.current_channel_index, None);
        assert!(snap.channel.is_none());
    }

    #[test]
    fn test_snapshot_progress_follows_archive_position() {
        let now = Local.with_ymd_and_hms(2024, 5, 14, 21, 0, 0).unwrap();
        let start = now - Duration::hours(3);
        let program = Program::new("p", "Film", "", start, start + Duration::hours(2), "a").unwrap();
        let session = PlaybackSession {
            channels: vec![Channel {
                id: "a".into(),
                name: "A".into(),
                ..Channel::default()
            }],
            current_program: Some(program),
            archive_position: Some(start + Duration::hours(1)),
            ..PlaybackSession::default()
        };
        let snap = session.snapshot(now);
        let program = snap.program.unwrap();
        assert!((program.progress - 0.5).abs() < 1e-9);
        assert_eq!(program.duration_minutes, 120);
        assert_eq!(snap.channel.unwrap().name, "A");
    }

    #[test]
    fn test_snapshot_serializes_mode_snake_case() {
        let snap = SessionSnapshot {
            mode: OverlayMode::Epg,
            ..SessionSnapshot::default()
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["mode"], "epg");
    }
}
