use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub lineup: LineupConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

/// Remote-key HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_volume")]
    pub default_volume: f32,
    /// Extra arguments appended to the mpv command line.
    #[serde(default)]
    pub mpv_args: Vec<String>,
}

/// Where the channel lineup and guide come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineupConfig {
    /// Local TOML lineup (highest priority).
    #[serde(default = "default_lineup_toml")]
    pub lineup_toml: PathBuf,
    /// URL or file path of an M3U playlist (used when the TOML lineup is absent).
    #[serde(default)]
    pub m3u_url: String,
    /// URL or file path of an XMLTV guide merged into the lineup.
    #[serde(default)]
    pub xmltv_url: Option<String>,
}

/// Timings and limits of the playback controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Seconds the controls bar stays up without input.
    #[serde(default = "default_controls_hide_secs")]
    pub controls_hide_secs: u64,
    /// Deadline for a stream URL request.
    #[serde(default = "default_stream_timeout_secs")]
    pub stream_timeout_secs: u64,
    /// Archive span assumed when the provider doesn't report one.
    #[serde(default = "default_fallback_archive_hours")]
    pub fallback_archive_hours: u32,
    /// How long transient notices stay visible.
    #[serde(default = "default_notice_secs")]
    pub notice_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            mpv_args: Vec::new(),
        }
    }
}

impl Default for LineupConfig {
    fn default() -> Self {
        Self {
            lineup_toml: default_lineup_toml(),
            m3u_url: String::new(),
            xmltv_url: None,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            controls_hide_secs: default_controls_hide_secs(),
            stream_timeout_secs: default_stream_timeout_secs(),
            fallback_archive_hours: default_fallback_archive_hours(),
            notice_secs: default_notice_secs(),
        }
    }
}

fn default_state_file() -> PathBuf {
    platform::data_dir().join("state.json")
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_volume() -> f32 {
    0.8
}

fn default_lineup_toml() -> PathBuf {
    platform::config_dir().join("channels.toml")
}

fn default_controls_hide_secs() -> u64 {
    15
}

fn default_stream_timeout_secs() -> u64 {
    10
}

fn default_fallback_archive_hours() -> u32 {
    crate::archive::DEFAULT_SPAN_HOURS
}

fn default_notice_secs() -> u64 {
    4
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
