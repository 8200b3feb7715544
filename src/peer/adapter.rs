//! Boundary trait between negotiation and the media engine
//!
//! The negotiator only ever talks to the engine through this trait, so the
//! state machine can be exercised without real ICE/DTLS and the engine can
//! be swapped out.

use async_trait::async_trait;

use crate::config::MediaProfile;
use crate::signaling::IceCandidate;
use crate::Result;

/// Which half of the offer/answer exchange a description belongs to
///
/// The media engine rebuilds descriptions from the raw SDP string and needs
/// to know which constructor to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Async interface to the local media-transport engine
///
/// All SDP payloads are opaque strings; the adapter never inspects them.
#[async_trait]
pub trait PeerConnectionAdapter: Send + Sync {
    /// Produce an offer description for the local endpoint
    async fn create_offer(&self) -> Result<String>;

    /// Produce an answer description matching the applied remote offer
    async fn create_answer(&self) -> Result<String>;

    /// Apply a locally created description
    async fn set_local_description(&self, kind: SdpKind, sdp: String) -> Result<()>;

    /// Apply the remote peer's description
    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<()>;

    /// Register a remote ICE candidate with the engine
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Attach local media tracks; must run before the description that is
    /// supposed to advertise them is created
    async fn add_local_media(&self, media: MediaProfile) -> Result<()>;

    /// Tear the underlying connection down
    async fn close(&self) -> Result<()>;
}
