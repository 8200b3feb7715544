//! Two-party WebRTC call negotiation over a WebSocket signaling relay
//!
//! This crate establishes a peer-to-peer media session between two endpoints
//! by exchanging session descriptions and ICE candidates through a simple
//! WebSocket relay, then driving a local WebRTC engine to completion.
//!
//! # Features
//!
//! - **JSON signaling envelope**: `OFFER` / `ANSWER` / `CANDIDATE` frames
//! - **Resilient relay transport**: non-blocking send queue, ordered inbound
//!   delivery, automatic reconnect, bad frames dropped without tearing the
//!   connection down
//! - **Offer/answer state machine**: caller/callee roles, early remote
//!   candidates buffered and applied exactly once
//! - **Engine boundary**: the negotiator drives any `PeerConnectionAdapter`,
//!   with a `webrtc`-crate implementation included
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │  CallSession (single-consumer event loop)       │
//! │  ├─ SignalingClient (WebSocket ↔ relay)         │
//! │  │   └─ SignalingMessage codec (JSON)           │
//! │  ├─ Negotiator (offer/answer state machine)     │
//! │  │   └─ PendingCandidateQueue                   │
//! │  └─ PeerConnectionAdapter                       │
//! │      └─ PeerConnection (webrtc crate)           │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use relaycall::{CallConfig, CallSession, MediaProfile};
//!
//! # async fn call() -> relaycall::Result<()> {
//! let config = CallConfig {
//!     signaling_url: "ws://localhost:8080/connect".to_string(),
//!     media: MediaProfile::AudioVideo,
//!     ..Default::default()
//! };
//!
//! let mut session = CallSession::new(config).await?;
//! // `true` makes this endpoint the caller
//! session.run(true).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod negotiation;
pub mod peer;
pub mod session;
pub mod signaling;

pub use config::{CallConfig, MediaProfile};
pub use error::{Error, Result};
pub use negotiation::{NegotiationState, Negotiator, SessionRole};
pub use peer::{PeerConnection, PeerConnectionAdapter, SdpKind};
pub use session::CallSession;
pub use signaling::{IceCandidate, SignalingClient, SignalingEvent, SignalingMessage};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the crate version
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
