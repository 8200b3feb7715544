//! Signaling: the JSON message envelope and the WebSocket relay client

pub mod client;
pub mod protocol;

pub use client::{SignalingClient, SignalingEvent};
pub use protocol::{DecodeError, IceCandidate, SignalingMessage};
