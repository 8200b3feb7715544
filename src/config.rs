//! Configuration types for call sessions

use serde::{Deserialize, Serialize};

/// Main configuration for a call session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// WebSocket signaling relay URL (ws:// or wss://)
    pub signaling_url: String,

    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// Which local media to attach before negotiating
    pub media: MediaProfile,

    /// Delay between signaling reconnect attempts, in milliseconds
    pub reconnect_delay_ms: u64,
}

/// Local media attachment profile
///
/// The original protocol had two client variants (video-only and
/// audio+video); a single profile value selects between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaProfile {
    /// Attach a video track only
    VideoOnly,
    /// Attach both audio and video tracks
    AudioVideo,
}

impl MediaProfile {
    /// Whether this profile includes an audio track
    pub fn has_audio(&self) -> bool {
        matches!(self, MediaProfile::AudioVideo)
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://localhost:8080/connect".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            media: MediaProfile::AudioVideo,
            reconnect_delay_ms: 3000,
        }
    }
}

impl CallConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `signaling_url` is not a valid WebSocket URL
    /// - `stun_servers` is empty
    /// - `reconnect_delay_ms` is zero
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !self.signaling_url.starts_with("ws://") && !self.signaling_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "signaling_url must start with ws:// or wss://, got {}",
                self.signaling_url
            )));
        }

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        if self.reconnect_delay_ms == 0 {
            return Err(Error::InvalidConfig(
                "reconnect_delay_ms must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}
