use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One scheduled broadcast on a channel.
///
/// Constructed only through [`Program::new`], which enforces `start < end`.
/// Fields are read-only once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawProgram")]
pub struct Program {
    id: String,
    title: String,
    description: String,
    start: DateTime<Local>,
    end: DateTime<Local>,
    channel_id: String,
}

impl Program {
    /// Returns `None` when `start >= end`.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        start: DateTime<Local>,
        end: DateTime<Local>,
        channel_id: impl Into<String>,
    ) -> Option<Self> {
        if start >= end {
            return None;
        }
        Some(Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            start,
            end,
            channel_id: channel_id.into(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn start(&self) -> DateTime<Local> {
        self.start
    }

    pub fn end(&self) -> DateTime<Local> {
        self.end
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }
}

#[derive(Deserialize)]
struct RawProgram {
    id: String,
    title: String,
    #[serde(default)]
    description: String,
    start: DateTime<Local>,
    end: DateTime<Local>,
    channel_id: String,
}

impl TryFrom<RawProgram> for Program {
    type Error = String;

    fn try_from(raw: RawProgram) -> Result<Self, Self::Error> {
        let id = raw.id.clone();
        Program::new(
            raw.id,
            raw.title,
            raw.description,
            raw.start,
            raw.end,
            raw.channel_id,
        )
        .ok_or_else(|| format!("program {} ends before it starts", id))
    }
}

/// A channel in the lineup.  `programs` is ordered by start time and
/// non-overlapping; lineup loaders are responsible for that.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Channel {
    pub id: String,
    pub name: String,
    /// Live stream URL; may carry catchup placeholders such as `{utc}`.
    pub stream_template: String,
    /// Separate catchup template (M3U `catchup-source`), when the provider has one.
    #[serde(default)]
    pub catchup_template: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    pub number: u32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub is_hd: bool,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub archive: ArchiveLimit,
    #[serde(default)]
    pub programs: Vec<Program>,
}

/// How far back a channel's archive reaches.
///
/// Kept as three explicit states so that "the provider didn't say" is never
/// confused with "the provider said there is no limit".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveLimit {
    /// Provider explicitly reports no lookback limit.
    Unbounded,
    /// Provider reports a limit in hours.  `0` means the channel has no archive.
    Bounded(u32),
    /// Provider gave no usable figure.
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchiveWindow {
    pub limit: ArchiveLimit,
}

impl ArchiveWindow {
    pub fn new(limit: ArchiveLimit) -> Self {
        Self { limit }
    }

    /// Map a raw provider `hours_back` figure, where `0` means "unknown".
    pub fn from_hours_back(hours_back: u32) -> Self {
        if hours_back == 0 {
            Self::new(ArchiveLimit::Unknown)
        } else {
            Self::new(ArchiveLimit::Bounded(hours_back))
        }
    }
}

/// A resolved, playable stream location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamInfo {
    pub uri: String,
    pub expires_at: DateTime<Local>,
    pub server_time: DateTime<Local>,
}

/// Coarse player state as seen by the controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum PlayerStatus {
    #[default]
    Idle,
    Buffering,
    Playing,
    Paused,
    Error,
}

impl PlayerStatus {
    /// Short label for the info bar badge.
    pub fn badge_label(&self) -> Option<&str> {
        match self {
            PlayerStatus::Idle => None,
            PlayerStatus::Buffering => Some("BUF"),
            PlayerStatus::Playing => Some("LIVE"),
            PlayerStatus::Paused => Some("PAUSE"),
            PlayerStatus::Error => Some("ERR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_program_rejects_empty_interval() {
        let t = Local.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert!(Program::new("p", "x", "", t, t, "c").is_none());
        assert!(Program::new("p", "x", "", t, t - Duration::minutes(1), "c").is_none());
        assert!(Program::new("p", "x", "", t, t + Duration::minutes(1), "c").is_some());
    }

    #[test]
    fn test_archive_window_from_hours_back() {
        assert_eq!(ArchiveWindow::from_hours_back(0).limit, ArchiveLimit::Unknown);
        assert_eq!(
            ArchiveWindow::from_hours_back(48).limit,
            ArchiveLimit::Bounded(48)
        );
    }

    #[test]
    fn test_archive_limit_toml_shape() {
        #[derive(Deserialize)]
        struct Wrap {
            limit: ArchiveLimit,
        }
        let w: Wrap = toml::from_str("limit = \"unbounded\"").unwrap();
        assert_eq!(w.limit, ArchiveLimit::Unbounded);
        let w: Wrap = toml::from_str("limit = { bounded = 72 }").unwrap();
        assert_eq!(w.limit, ArchiveLimit::Bounded(72));
    }
}
