//! Signaling envelope: JSON message types and the frame codec
//!
//! One `SignalingMessage` per text frame. Every encoded frame carries an
//! explicit `type` discriminator (`OFFER`, `ANSWER`, `CANDIDATE`). The
//! original protocol identified candidate frames by the *absence* of a
//! `type` field; decoding still accepts that shape for compatibility, but
//! we never emit it.

use serde::{Deserialize, Serialize};

/// A single ICE connectivity candidate proposed by a peer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceCandidate {
    /// Media stream identification tag this candidate belongs to
    #[serde(rename = "sdpMid")]
    pub sdp_mid: String,

    /// Index of the media description this candidate belongs to
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_m_line_index: u16,

    /// The candidate-attribute line (address/port/protocol)
    pub candidate: String,
}

/// Signaling message exchanged through the relay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum SignalingMessage {
    /// Session-description offer from the caller
    #[serde(rename = "OFFER")]
    Offer {
        /// Opaque SDP payload
        sdp: String,
    },

    /// Session-description answer from the callee
    #[serde(rename = "ANSWER")]
    Answer {
        /// Opaque SDP payload
        sdp: String,
    },

    /// ICE candidate from either side
    #[serde(rename = "CANDIDATE")]
    Candidate(IceCandidate),
}

/// Why an inbound frame could not be decoded
///
/// Decode failures are recovered at the transport: the frame is dropped and
/// the connection stays up, so this error never crosses into negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Frame is not valid JSON, or a recognized variant with broken fields
    #[error("malformed signaling frame")]
    Malformed,

    /// Valid JSON, but no recognized message discriminator
    #[error("unknown signaling message type")]
    UnknownMessageType,
}

impl SignalingMessage {
    /// Build an offer message
    pub fn offer(sdp: impl Into<String>) -> Self {
        SignalingMessage::Offer { sdp: sdp.into() }
    }

    /// Build an answer message
    pub fn answer(sdp: impl Into<String>) -> Self {
        SignalingMessage::Answer { sdp: sdp.into() }
    }

    /// Build a candidate message
    pub fn candidate(candidate: IceCandidate) -> Self {
        SignalingMessage::Candidate(candidate)
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Offer { .. } => "OFFER",
            SignalingMessage::Answer { .. } => "ANSWER",
            SignalingMessage::Candidate(_) => "CANDIDATE",
        }
    }

    /// Encode to a JSON text frame
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SignalingError(format!("Failed to serialize signaling message: {}", e))
        })
    }

    /// Decode a JSON text frame
    ///
    /// Inspects the `type` discriminator first; frames without one are
    /// accepted as candidates when they carry the candidate-specific fields
    /// (the shape the original peer emits).
    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|_| DecodeError::Malformed)?;

        match value.get("type").and_then(|t| t.as_str()) {
            Some("OFFER") | Some("ANSWER") | Some("CANDIDATE") => {
                serde_json::from_value(value).map_err(|_| DecodeError::Malformed)
            }
            Some(_) => Err(DecodeError::UnknownMessageType),
            None => {
                if value.get("candidate").is_some() && value.get("sdpMid").is_some() {
                    serde_json::from_value::<IceCandidate>(value)
                        .map(SignalingMessage::Candidate)
                        .map_err(|_| DecodeError::Malformed)
                } else {
                    Err(DecodeError::UnknownMessageType)
                }
            }
        }
    }
}
