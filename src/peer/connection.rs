//! WebRTC-backed peer connection
//!
//! Wraps a `webrtc::RTCPeerConnection` and implements `PeerConnectionAdapter`
//! on top of it. Locally gathered ICE candidates are forwarded over a channel
//! so the session loop can relay them to the remote peer.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use super::adapter::{PeerConnectionAdapter, SdpKind};
use crate::config::{CallConfig, MediaProfile};
use crate::signaling::IceCandidate;
use crate::{Error, Result};

/// WebRTC peer connection wrapper
pub struct PeerConnection {
    /// Unique identifier for this connection instance
    connection_id: String,

    /// Actual WebRTC peer connection
    peer_connection: Arc<RTCPeerConnection>,

    /// RTP senders retained to prevent track cleanup
    senders: tokio::sync::Mutex<Vec<Arc<RTCRtpSender>>>,
}

impl PeerConnection {
    /// Create a new peer connection
    ///
    /// Locally gathered ICE candidates are delivered on `candidate_tx`; the
    /// session loop forwards them to the signaling relay.
    pub async fn new(
        config: &CallConfig,
        candidate_tx: mpsc::UnboundedSender<IceCandidate>,
    ) -> Result<Self> {
        let connection_id = uuid::Uuid::new_v4().to_string();

        info!("Creating peer connection: connection_id={}", connection_id);

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::PeerConnectionError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry = register_default_interceptors(Default::default(), &mut media_engine)
            .map_err(|e| {
                Error::PeerConnectionError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection =
            Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
                Error::PeerConnectionError(format!("Failed to create peer connection: {}", e))
            })?);

        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let candidate_tx = candidate_tx.clone();
            Box::pin(async move {
                // None marks the end of gathering
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => {
                        let forwarded = IceCandidate {
                            sdp_mid: init.sdp_mid.unwrap_or_default(),
                            sdp_m_line_index: init.sdp_mline_index.unwrap_or_default(),
                            candidate: init.candidate,
                        };
                        if candidate_tx.send(forwarded).is_err() {
                            debug!("Session gone, dropping local candidate");
                        }
                    }
                    Err(e) => warn!("Failed to serialize local candidate: {}", e),
                }
            })
        }));

        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                Box::pin(async move {
                    info!("Peer connection state changed: {}", s);
                })
            },
        ));

        Ok(Self {
            connection_id,
            peer_connection,
            senders: tokio::sync::Mutex::new(Vec::new()),
        })
    }

    /// Get the connection ID
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    async fn add_video_track(&self) -> Result<()> {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: "video/VP8".to_string(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            format!("video-{}", self.connection_id),
            format!("stream-{}", self.connection_id),
        ));

        let sender = self
            .peer_connection
            .add_track(track as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to add video track: {}", e)))?;
        self.senders.lock().await.push(sender);

        debug!("Video track added to connection {}", self.connection_id);
        Ok(())
    }

    async fn add_audio_track(&self) -> Result<()> {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            format!("audio-{}", self.connection_id),
            format!("stream-{}", self.connection_id),
        ));

        let sender = self
            .peer_connection
            .add_track(track as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to add audio track: {}", e)))?;
        self.senders.lock().await.push(sender);

        debug!("Audio track added to connection {}", self.connection_id);
        Ok(())
    }

    fn rebuild_description(kind: SdpKind, sdp: String) -> Result<RTCSessionDescription> {
        match kind {
            SdpKind::Offer => RTCSessionDescription::offer(sdp)
                .map_err(|e| Error::SdpError(format!("Failed to parse offer: {}", e))),
            SdpKind::Answer => RTCSessionDescription::answer(sdp)
                .map_err(|e| Error::SdpError(format!("Failed to parse answer: {}", e))),
        }
    }
}

#[async_trait]
impl PeerConnectionAdapter for PeerConnection {
    async fn create_offer(&self) -> Result<String> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;

        debug!("Created SDP offer for connection {}", self.connection_id);
        Ok(offer.sdp)
    }

    async fn create_answer(&self) -> Result<String> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;

        debug!("Created SDP answer for connection {}", self.connection_id);
        Ok(answer.sdp)
    }

    async fn set_local_description(&self, kind: SdpKind, sdp: String) -> Result<()> {
        let description = Self::rebuild_description(kind, sdp)?;
        self.peer_connection
            .set_local_description(description)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))
    }

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<()> {
        let description = Self::rebuild_description(kind, sdp)?;
        self.peer_connection
            .set_remote_description(description)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        debug!(
            "Adding ICE candidate to connection {}: {}",
            self.connection_id, candidate.candidate
        );

        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: Some(candidate.sdp_mid),
            sdp_mline_index: Some(candidate.sdp_m_line_index),
            username_fragment: None,
        };

        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::IceCandidateError(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn add_local_media(&self, media: MediaProfile) -> Result<()> {
        info!(
            "Attaching local media ({:?}) to connection {}",
            media, self.connection_id
        );

        self.add_video_track().await?;
        if media.has_audio() {
            self.add_audio_track().await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        info!("Closing peer connection {}", self.connection_id);
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::PeerConnectionError(format!("Failed to close connection: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connection() -> (PeerConnection, mpsc::UnboundedReceiver<IceCandidate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pc = PeerConnection::new(&CallConfig::default(), tx).await.unwrap();
        (pc, rx)
    }

    #[tokio::test]
    async fn test_create_offer() {
        let (pc, _rx) = connection().await;
        let sdp = pc.create_offer().await.unwrap();
        assert!(!sdp.is_empty());
    }

    #[tokio::test]
    async fn test_offer_includes_media() {
        let (pc, _rx) = connection().await;
        pc.add_local_media(MediaProfile::AudioVideo).await.unwrap();

        let sdp = pc.create_offer().await.unwrap();
        assert!(sdp.contains("video"));
        assert!(sdp.contains("audio"));
    }

    #[tokio::test]
    async fn test_video_only_profile_skips_audio() {
        let (pc, _rx) = connection().await;
        pc.add_local_media(MediaProfile::VideoOnly).await.unwrap();

        let sdp = pc.create_offer().await.unwrap();
        assert!(sdp.contains("video"));
        assert!(!sdp.contains("m=audio"));
    }

    #[tokio::test]
    async fn test_close() {
        let (pc, _rx) = connection().await;
        pc.close().await.unwrap();
    }
}
