//! Channel data provider: the controller's only source of channels,
//! schedules, stream URLs and archive windows.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local};
use tokio::sync::RwLock;
use tracing::{debug, info};
use tv_proto::config::LineupConfig;
use tv_proto::lineup::{self, expand_template, has_placeholders};
use tv_proto::protocol::{ArchiveWindow, Channel, Program, StreamInfo};
use tv_proto::schedule;

use crate::error::ProviderError;

/// How long a resolved stream URL is advertised as valid.
const STREAM_VALIDITY_HOURS: i64 = 1;

#[async_trait]
pub trait ChannelDataProvider: Send + Sync {
    async fn list_channels(&self) -> Result<Vec<Channel>, ProviderError>;

    async fn current_program(
        &self,
        channel_id: &str,
        now: DateTime<Local>,
    ) -> Result<Option<Program>, ProviderError>;

    /// `Ok(None)` means the channel has no playable stream for `at`.
    async fn stream_url(
        &self,
        channel_id: &str,
        at: Option<DateTime<Local>>,
    ) -> Result<Option<StreamInfo>, ProviderError>;

    async fn archive_window(&self, channel_id: &str) -> Result<ArchiveWindow, ProviderError>;

    async fn set_favorite(&self, channel_id: &str, favorite: bool) -> Result<(), ProviderError>;
}

/// Provider over a lineup loaded once from the configured sources.
pub struct LineupProvider {
    config: LineupConfig,
    channels: RwLock<Option<Vec<Channel>>>,
}

impl LineupProvider {
    pub fn new(config: LineupConfig) -> Self {
        Self {
            config,
            channels: RwLock::new(None),
        }
    }

    /// Provider over an already-built lineup; nothing is read from disk.
    pub fn from_channels(channels: Vec<Channel>) -> Self {
        Self {
            config: LineupConfig::default(),
            channels: RwLock::new(Some(channels)),
        }
    }

    async fn with_channel<T>(
        &self,
        channel_id: &str,
        f: impl FnOnce(&Channel) -> T + Send,
    ) -> Result<T, ProviderError> {
        let guard = self.channels.read().await;
        guard
            .as_ref()
            .and_then(|chs| chs.iter().find(|c| c.id == channel_id))
            .map(f)
            .ok_or_else(|| ProviderError::UnknownChannel(channel_id.to_string()))
    }
}

/// Pick the template for `at` and expand it.  Archived requests need a
/// catchup template or a stream template carrying placeholders.
fn resolve_uri(channel: &Channel, at: Option<DateTime<Local>>, now: DateTime<Local>) -> Option<String> {
    let (template, instant) = match at {
        None => (channel.stream_template.as_str(), now),
        Some(at) => {
            let template = channel
                .catchup_template
                .as_deref()
                .filter(|t| !t.is_empty())
                .or_else(|| {
                    Some(channel.stream_template.as_str()).filter(|t| has_placeholders(t))
                })?;
            (template, at)
        }
    };
    if template.trim().is_empty() {
        return None;
    }
    Some(expand_template(template, instant, now))
}

#[async_trait]
impl ChannelDataProvider for LineupProvider {
    async fn list_channels(&self) -> Result<Vec<Channel>, ProviderError> {
        if let Some(channels) = self.channels.read().await.as_ref() {
            return Ok(channels.clone());
        }
        let loaded = lineup::load_lineup(&self.config)
            .await
            .map_err(|e| ProviderError::Fetch(format!("{:#}", e)))?;
        info!("provider: lineup ready with {} channels", loaded.len());
        let mut guard = self.channels.write().await;
        // Another caller may have finished loading first; keep its copy.
        Ok(guard.get_or_insert(loaded).clone())
    }

    async fn current_program(
        &self,
        channel_id: &str,
        now: DateTime<Local>,
    ) -> Result<Option<Program>, ProviderError> {
        self.with_channel(channel_id, |c| schedule::program_at(&c.programs, now).cloned())
            .await
    }

    async fn stream_url(
        &self,
        channel_id: &str,
        at: Option<DateTime<Local>>,
    ) -> Result<Option<StreamInfo>, ProviderError> {
        let now = Local::now();
        let uri = self
            .with_channel(channel_id, |c| resolve_uri(c, at, now))
            .await?;
        debug!("provider: stream_url {} at {:?} -> {:?}", channel_id, at, uri);
        Ok(uri.map(|uri| StreamInfo {
            uri,
            expires_at: now + Duration::hours(STREAM_VALIDITY_HOURS),
            server_time: now,
        }))
    }

    async fn archive_window(&self, channel_id: &str) -> Result<ArchiveWindow, ProviderError> {
        self.with_channel(channel_id, |c| ArchiveWindow::new(c.archive))
            .await
    }

    async fn set_favorite(&self, channel_id: &str, favorite: bool) -> Result<(), ProviderError> {
        let mut guard = self.channels.write().await;
        let channel = guard
            .as_mut()
            .and_then(|chs| chs.iter_mut().find(|c| c.id == channel_id))
            .ok_or_else(|| ProviderError::UnknownChannel(channel_id.to_string()))?;
        channel.favorite = favorite;
        Ok(())
    }
}
