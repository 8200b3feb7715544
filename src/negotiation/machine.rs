//! Offer/answer negotiation state machine
//!
//! The negotiator classifies inbound signaling messages against the current
//! state, applies each description exactly once, and buffers remote ICE
//! candidates that arrive before the session is stable. It runs inside the
//! session event loop, so every method completes before the next message is
//! dispatched and no internal locking is needed.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::peer::{PeerConnectionAdapter, SdpKind};
use crate::signaling::{IceCandidate, SignalingMessage};
use crate::{Error, Result};

/// Which side of the exchange this endpoint plays
///
/// Fixed at the first negotiation action and never changes for the lifetime
/// of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Sent the offer
    Caller,
    /// Received the offer
    Callee,
}

/// Negotiation progress for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// No description exchanged yet
    Idle,
    /// Waiting for the local description to be created and applied
    AwaitingLocalDescription,
    /// Local description applied, waiting for the remote one
    AwaitingRemoteDescription,
    /// Both descriptions applied
    Stable,
}

/// Ordered buffer for remote candidates that arrive before both
/// descriptions are in place
///
/// Drained exactly once, on the transition into `Stable`.
#[derive(Debug, Default)]
pub struct PendingCandidateQueue {
    candidates: VecDeque<IceCandidate>,
}

impl PendingCandidateQueue {
    pub fn push(&mut self, candidate: IceCandidate) {
        self.candidates.push_back(candidate);
    }

    /// Take every buffered candidate, in arrival order
    pub fn drain(&mut self) -> impl Iterator<Item = IceCandidate> + '_ {
        self.candidates.drain(..)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Drives one offer/answer exchange to completion
pub struct Negotiator {
    state: NegotiationState,
    role: Option<SessionRole>,
    pending: PendingCandidateQueue,
    adapter: Arc<dyn PeerConnectionAdapter>,
    outbound: mpsc::UnboundedSender<SignalingMessage>,
}

impl Negotiator {
    /// Create a negotiator in `Idle` with no role fixed
    pub fn new(
        adapter: Arc<dyn PeerConnectionAdapter>,
        outbound: mpsc::UnboundedSender<SignalingMessage>,
    ) -> Self {
        Self {
            state: NegotiationState::Idle,
            role: None,
            pending: PendingCandidateQueue::default(),
            adapter,
            outbound,
        }
    }

    /// Current negotiation state
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Role, once fixed
    pub fn role(&self) -> Option<SessionRole> {
        self.role
    }

    /// Number of remote candidates still buffered
    pub fn pending_candidates(&self) -> usize {
        self.pending.len()
    }

    /// Start a call as the caller
    ///
    /// Only valid from `Idle`; renegotiation of an in-flight or stable
    /// session is not supported.
    ///
    /// # Errors
    ///
    /// `Error::InvalidState` outside `Idle`; adapter errors are surfaced
    /// unchanged and terminal for the session.
    pub async fn initiate_call(&mut self) -> Result<()> {
        if self.state != NegotiationState::Idle {
            return Err(Error::InvalidState(format!(
                "cannot initiate a call in state {:?}",
                self.state
            )));
        }

        self.role = Some(SessionRole::Caller);
        self.state = NegotiationState::AwaitingLocalDescription;
        info!("Initiating call as caller");

        let sdp = match self.adapter.create_offer().await {
            Ok(sdp) => sdp,
            Err(e) => {
                error!("Offer creation failed: {}", e);
                return Err(e);
            }
        };
        if let Err(e) = self
            .adapter
            .set_local_description(SdpKind::Offer, sdp.clone())
            .await
        {
            error!("Failed to apply local offer: {}", e);
            return Err(e);
        }

        self.state = NegotiationState::AwaitingRemoteDescription;
        self.send(SignalingMessage::offer(sdp))
    }

    /// Dispatch one inbound signaling message
    pub async fn handle_message(&mut self, message: SignalingMessage) -> Result<()> {
        match message {
            SignalingMessage::Offer { sdp } => self.on_offer_received(sdp).await,
            SignalingMessage::Answer { sdp } => self.on_answer_received(sdp).await,
            SignalingMessage::Candidate(candidate) => {
                self.on_candidate_received(candidate).await;
                Ok(())
            }
        }
    }

    /// Handle a remote offer
    ///
    /// Valid only in `Idle` before any role is fixed; an offer arriving after
    /// this endpoint initiated, or mid-exchange, is logged and ignored.
    pub async fn on_offer_received(&mut self, sdp: String) -> Result<()> {
        if self.state != NegotiationState::Idle || self.role.is_some() {
            warn!(
                "Ignoring offer in state {:?} (role {:?})",
                self.state, self.role
            );
            return Ok(());
        }

        self.role = Some(SessionRole::Callee);
        info!("Received offer, answering as callee");

        if let Err(e) = self
            .adapter
            .set_remote_description(SdpKind::Offer, sdp)
            .await
        {
            error!("Failed to apply remote offer: {}", e);
            return Err(e);
        }
        self.state = NegotiationState::AwaitingLocalDescription;

        let answer = match self.adapter.create_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Answer creation failed: {}", e);
                return Err(e);
            }
        };
        if let Err(e) = self
            .adapter
            .set_local_description(SdpKind::Answer, answer.clone())
            .await
        {
            error!("Failed to apply local answer: {}", e);
            return Err(e);
        }

        self.send(SignalingMessage::answer(answer))?;
        self.enter_stable().await;
        Ok(())
    }

    /// Handle a remote answer
    ///
    /// Valid only while this endpoint is a caller awaiting the remote
    /// description. Answers in any other state (duplicates, stale frames
    /// from a previous attempt) are ignored.
    pub async fn on_answer_received(&mut self, sdp: String) -> Result<()> {
        if self.state != NegotiationState::AwaitingRemoteDescription
            || self.role != Some(SessionRole::Caller)
        {
            debug!(
                "Ignoring answer in state {:?} (role {:?})",
                self.state, self.role
            );
            return Ok(());
        }

        if let Err(e) = self
            .adapter
            .set_remote_description(SdpKind::Answer, sdp)
            .await
        {
            error!("Failed to apply remote answer: {}", e);
            return Err(e);
        }

        self.enter_stable().await;
        Ok(())
    }

    /// Handle a remote ICE candidate
    ///
    /// Applied immediately once stable; buffered in arrival order otherwise.
    /// Individual apply failures are logged and swallowed.
    pub async fn on_candidate_received(&mut self, candidate: IceCandidate) {
        if self.state == NegotiationState::Stable {
            debug!("Applying remote candidate");
            if let Err(e) = self.adapter.add_ice_candidate(candidate).await {
                warn!("Failed to apply remote candidate: {}", e);
            }
        } else {
            debug!(
                "Buffering remote candidate ({} pending)",
                self.pending.len() + 1
            );
            self.pending.push(candidate);
        }
    }

    /// Enter `Stable` and flush the candidate buffer
    async fn enter_stable(&mut self) {
        self.state = NegotiationState::Stable;
        info!(
            "Negotiation stable ({} buffered candidates)",
            self.pending.len()
        );

        let buffered: Vec<IceCandidate> = self.pending.drain().collect();
        for candidate in buffered {
            if let Err(e) = self.adapter.add_ice_candidate(candidate).await {
                warn!("Failed to apply buffered candidate: {}", e);
            }
        }
    }

    fn send(&self, message: SignalingMessage) -> Result<()> {
        self.outbound.send(message).map_err(|_| {
            Error::SignalingError("signaling outbound queue is closed".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::config::MediaProfile;

    /// Records adapter calls and optionally fails offer creation
    #[derive(Default)]
    struct MockAdapter {
        calls: Mutex<Vec<String>>,
        fail_create_offer: bool,
    }

    impl MockAdapter {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn candidate_count(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| c.starts_with("add_ice_candidate"))
                .count()
        }
    }

    #[async_trait]
    impl PeerConnectionAdapter for MockAdapter {
        async fn create_offer(&self) -> Result<String> {
            if self.fail_create_offer {
                return Err(Error::SdpError("engine refused".to_string()));
            }
            self.record("create_offer");
            Ok("v=0 offer".to_string())
        }

        async fn create_answer(&self) -> Result<String> {
            self.record("create_answer");
            Ok("v=0 answer".to_string())
        }

        async fn set_local_description(&self, kind: SdpKind, _sdp: String) -> Result<()> {
            self.record(format!("set_local_description:{:?}", kind));
            Ok(())
        }

        async fn set_remote_description(&self, kind: SdpKind, _sdp: String) -> Result<()> {
            self.record(format!("set_remote_description:{:?}", kind));
            Ok(())
        }

        async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
            self.record(format!("add_ice_candidate:{}", candidate.candidate));
            Ok(())
        }

        async fn add_local_media(&self, _media: MediaProfile) -> Result<()> {
            self.record("add_local_media");
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.record("close");
            Ok(())
        }
    }

    fn candidate(tag: &str) -> IceCandidate {
        IceCandidate {
            sdp_mid: "0".to_string(),
            sdp_m_line_index: 0,
            candidate: tag.to_string(),
        }
    }

    fn negotiator() -> (
        Negotiator,
        Arc<MockAdapter>,
        mpsc::UnboundedReceiver<SignalingMessage>,
    ) {
        let adapter = Arc::new(MockAdapter::default());
        let (tx, rx) = mpsc::unbounded_channel();
        (Negotiator::new(adapter.clone(), tx), adapter, rx)
    }

    #[tokio::test]
    async fn test_caller_happy_path() {
        let (mut neg, _adapter, mut rx) = negotiator();

        neg.initiate_call().await.unwrap();
        assert_eq!(neg.state(), NegotiationState::AwaitingRemoteDescription);
        assert_eq!(neg.role(), Some(SessionRole::Caller));
        assert!(matches!(
            rx.try_recv().unwrap(),
            SignalingMessage::Offer { .. }
        ));

        neg.on_answer_received("v=0 remote answer".to_string())
            .await
            .unwrap();
        assert_eq!(neg.state(), NegotiationState::Stable);
    }

    #[tokio::test]
    async fn test_callee_happy_path() {
        let (mut neg, adapter, mut rx) = negotiator();

        neg.on_offer_received("v=0 remote offer".to_string())
            .await
            .unwrap();
        assert_eq!(neg.state(), NegotiationState::Stable);
        assert_eq!(neg.role(), Some(SessionRole::Callee));
        assert!(matches!(
            rx.try_recv().unwrap(),
            SignalingMessage::Answer { .. }
        ));
        assert_eq!(
            adapter.calls(),
            vec![
                "set_remote_description:Offer",
                "create_answer",
                "set_local_description:Answer",
            ]
        );
    }

    #[tokio::test]
    async fn test_early_candidates_buffered_then_drained_in_order() {
        let (mut neg, adapter, _rx) = negotiator();

        neg.on_candidate_received(candidate("a")).await;
        neg.on_candidate_received(candidate("b")).await;
        assert_eq!(neg.pending_candidates(), 2);
        assert_eq!(adapter.candidate_count(), 0);

        neg.on_offer_received("v=0 remote offer".to_string())
            .await
            .unwrap();

        assert_eq!(neg.pending_candidates(), 0);
        let candidates: Vec<String> = adapter
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("add_ice_candidate"))
            .collect();
        assert_eq!(
            candidates,
            vec!["add_ice_candidate:a", "add_ice_candidate:b"]
        );
    }

    #[tokio::test]
    async fn test_candidate_applied_immediately_when_stable() {
        let (mut neg, adapter, _rx) = negotiator();
        neg.on_offer_received("v=0 remote offer".to_string())
            .await
            .unwrap();

        neg.on_candidate_received(candidate("late")).await;
        assert_eq!(neg.pending_candidates(), 0);
        assert_eq!(adapter.candidate_count(), 1);
    }

    #[tokio::test]
    async fn test_answer_ignored_in_idle() {
        let (mut neg, adapter, _rx) = negotiator();

        neg.on_answer_received("v=0 stray".to_string())
            .await
            .unwrap();
        assert_eq!(neg.state(), NegotiationState::Idle);
        assert!(adapter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_answer_does_not_redrain() {
        let (mut neg, adapter, _rx) = negotiator();

        neg.on_candidate_received(candidate("early")).await;
        neg.initiate_call().await.unwrap();
        neg.on_answer_received("v=0 answer".to_string())
            .await
            .unwrap();
        assert_eq!(neg.state(), NegotiationState::Stable);
        assert_eq!(adapter.candidate_count(), 1);

        // The drain must not run a second time
        neg.on_answer_received("v=0 duplicate".to_string())
            .await
            .unwrap();
        assert_eq!(adapter.candidate_count(), 1);
    }

    #[tokio::test]
    async fn test_offer_after_initiate_is_ignored() {
        let (mut neg, _adapter, mut rx) = negotiator();

        neg.initiate_call().await.unwrap();
        let _ = rx.try_recv();

        neg.on_offer_received("v=0 glare".to_string()).await.unwrap();
        assert_eq!(neg.role(), Some(SessionRole::Caller));
        assert_eq!(neg.state(), NegotiationState::AwaitingRemoteDescription);
        // No answer was produced for the ignored offer
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_initiate_twice_is_invalid_state() {
        let (mut neg, _adapter, _rx) = negotiator();

        neg.initiate_call().await.unwrap();
        let err = neg.initiate_call().await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_offer_creation_failure_is_surfaced() {
        let adapter = Arc::new(MockAdapter {
            fail_create_offer: true,
            ..Default::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut neg = Negotiator::new(adapter, tx);

        let err = neg.initiate_call().await.unwrap_err();
        assert!(err.is_adapter_error());
        assert!(rx.try_recv().is_err());
    }
}
