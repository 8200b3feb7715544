//! Peer: the media-engine boundary trait and its WebRTC implementation

pub mod adapter;
pub mod connection;

pub use adapter::{PeerConnectionAdapter, SdpKind};
pub use connection::PeerConnection;
