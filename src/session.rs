//! Call session: wires signaling, negotiation, and the media engine together
//!
//! One `CallSession` per call attempt. Construction is explicit and ordered:
//! the config is validated, the engine adapter is built with its media
//! attached, the signaling connection is spawned, and only then does the
//! negotiator exist. A failed or abandoned session is discarded whole; a new
//! attempt starts from a fresh `CallSession`.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::config::CallConfig;
use crate::negotiation::{NegotiationState, Negotiator};
use crate::peer::{PeerConnection, PeerConnectionAdapter};
use crate::signaling::{IceCandidate, SignalingClient, SignalingEvent, SignalingMessage};
use crate::{Error, Result};

/// A single two-party call attempt
pub struct CallSession {
    signaling: SignalingClient,
    events: mpsc::UnboundedReceiver<SignalingEvent>,
    negotiator: Negotiator,
    adapter: Arc<dyn PeerConnectionAdapter>,
    local_candidates: mpsc::UnboundedReceiver<IceCandidate>,
    state_tx: watch::Sender<NegotiationState>,
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession").finish_non_exhaustive()
    }
}

impl CallSession {
    /// Create a session backed by a real WebRTC peer connection
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the media engine cannot
    /// be constructed.
    pub async fn new(config: CallConfig) -> Result<Self> {
        let (candidate_tx, candidate_rx) = mpsc::unbounded_channel();
        let adapter = Arc::new(PeerConnection::new(&config, candidate_tx).await?);
        Self::with_adapter(config, adapter, candidate_rx).await
    }

    /// Create a session around an externally constructed engine adapter
    ///
    /// `local_candidates` carries the adapter's locally gathered candidates;
    /// the session relays them to the remote peer.
    pub async fn with_adapter(
        config: CallConfig,
        adapter: Arc<dyn PeerConnectionAdapter>,
        local_candidates: mpsc::UnboundedReceiver<IceCandidate>,
    ) -> Result<Self> {
        config.validate()?;

        // Tracks must exist before the description that advertises them
        adapter.add_local_media(config.media).await?;

        let (signaling, events) = SignalingClient::connect(
            config.signaling_url.clone(),
            std::time::Duration::from_millis(config.reconnect_delay_ms),
        );
        let negotiator = Negotiator::new(adapter.clone(), signaling.sender());
        let (state_tx, _) = watch::channel(NegotiationState::Idle);

        Ok(Self {
            signaling,
            events,
            negotiator,
            adapter,
            local_candidates,
            state_tx,
        })
    }

    /// Subscribe to negotiation state changes
    ///
    /// Useful for waiting on `Stable` while `run` drives the session on
    /// another task.
    pub fn state_updates(&self) -> watch::Receiver<NegotiationState> {
        self.state_tx.subscribe()
    }

    /// Drive the session until it ends
    ///
    /// The single consumer of the signaling event stream; every negotiator
    /// call completes before the next event is dispatched, which keeps
    /// message handling serialized and in arrival order.
    ///
    /// If `initiate` is true this endpoint sends the offer once the relay
    /// connection is up; otherwise it waits to answer.
    ///
    /// # Errors
    ///
    /// `Error::SessionAbandoned` when the relay connection is lost or
    /// replaced mid-session; adapter errors are surfaced unchanged. Either
    /// way the session is finished and must not be reused.
    pub async fn run(&mut self, initiate: bool) -> Result<()> {
        let result = self.event_loop(initiate).await;
        self.shutdown().await;
        result
    }

    async fn event_loop(&mut self, initiate: bool) -> Result<()> {
        let mut connected = false;

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        Some(SignalingEvent::Connected) => {
                            if connected {
                                // Negotiation state never survives a relay
                                // reconnect; the whole attempt starts over
                                return Err(Error::SessionAbandoned(
                                    "signaling relay connection was replaced".to_string(),
                                ));
                            }
                            connected = true;
                            if initiate {
                                self.negotiator.initiate_call().await?;
                            }
                        }
                        Some(SignalingEvent::Message(message)) => {
                            self.negotiator.handle_message(message).await?;
                        }
                        None => {
                            return Err(Error::SessionAbandoned(
                                "signaling event stream ended".to_string(),
                            ));
                        }
                    }
                    self.publish_state();
                }

                Some(candidate) = self.local_candidates.recv() => {
                    if let Err(e) = self.signaling.send(SignalingMessage::candidate(candidate)) {
                        warn!("Failed to queue local candidate: {}", e);
                    }
                }
            }
        }
    }

    /// Shut the signaling connection and the media engine down
    ///
    /// `run` does this on exit; calling it directly is only needed when the
    /// session is dropped without ever running.
    pub async fn close(&mut self) {
        self.shutdown().await;
    }

    fn publish_state(&self) {
        let state = self.negotiator.state();
        if *self.state_tx.borrow() != state {
            let _ = self.state_tx.send(state);
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down call session");
        self.signaling.close();
        if let Err(e) = self.adapter.close().await {
            error!("Failed to close peer connection: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::config::MediaProfile;
    use crate::peer::SdpKind;

    struct NullEngine;

    #[async_trait]
    impl PeerConnectionAdapter for NullEngine {
        async fn create_offer(&self) -> Result<String> {
            Ok(String::new())
        }

        async fn create_answer(&self) -> Result<String> {
            Ok(String::new())
        }

        async fn set_local_description(&self, _kind: SdpKind, _sdp: String) -> Result<()> {
            Ok(())
        }

        async fn set_remote_description(&self, _kind: SdpKind, _sdp: String) -> Result<()> {
            Ok(())
        }

        async fn add_ice_candidate(&self, _candidate: IceCandidate) -> Result<()> {
            Ok(())
        }

        async fn add_local_media(&self, _media: MediaProfile) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_connecting() {
        let config = CallConfig {
            signaling_url: "http://not-a-websocket".to_string(),
            ..Default::default()
        };
        let (_candidate_tx, candidate_rx) = mpsc::unbounded_channel();

        let err = CallSession::with_adapter(config, Arc::new(NullEngine), candidate_rx)
            .await
            .unwrap_err();
        assert!(err.is_config_error());
    }
}
