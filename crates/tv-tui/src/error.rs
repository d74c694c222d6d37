//! Controller and provider error types.
//!
//! None of these are fatal: the controller logs them and shows a notice.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlaybackError {
    #[error("channel data unavailable: {0}")]
    DataUnavailable(String),

    #[error("no playable stream for channel {channel_id}")]
    StreamUnplayable { channel_id: String },

    #[error("no selectable rewind time")]
    EmptyDomain,

    #[error("stale response for channel {channel_id}")]
    StaleResponse { channel_id: String },

    #[error("stream request for channel {channel_id} timed out")]
    Timeout { channel_id: String },
}

impl PlaybackError {
    /// Text for the on-screen notice.  Stale responses are never shown.
    pub fn notice(&self) -> Option<String> {
        match self {
            PlaybackError::StaleResponse { .. } => None,
            PlaybackError::DataUnavailable(_) => Some("Channel data unavailable".to_string()),
            PlaybackError::StreamUnplayable { .. } => Some("Channel unavailable".to_string()),
            PlaybackError::EmptyDomain => Some("No archive for this channel".to_string()),
            PlaybackError::Timeout { .. } => Some("Channel took too long to respond".to_string()),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("unknown channel {0}")]
    UnknownChannel(String),

    #[error("fetch failed: {0}")]
    Fetch(String),
}

impl From<ProviderError> for PlaybackError {
    fn from(e: ProviderError) -> Self {
        PlaybackError::DataUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_has_no_notice() {
        let e = PlaybackError::StaleResponse {
            channel_id: "5".into(),
        };
        assert!(e.notice().is_none());
        assert!(PlaybackError::EmptyDomain.notice().is_some());
    }

    #[test]
    fn test_provider_error_maps_to_data_unavailable() {
        let e: PlaybackError = ProviderError::UnknownChannel("x".into()).into();
        assert_eq!(
            e,
            PlaybackError::DataUnavailable("unknown channel x".into())
        );
    }
}
