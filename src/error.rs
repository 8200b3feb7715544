//! Error types for call negotiation and signaling

/// Result type alias using the crate Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating or signaling a call
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Signaling send/queue error
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// SDP negotiation error (offer/answer creation or description set failure)
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// WebRTC peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// Operation attempted in a negotiation state that does not allow it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The session was invalidated (signaling connection lost or replaced);
    /// negotiation must restart from scratch with a fresh session
    #[error("Session abandoned: {0}")]
    SessionAbandoned(String),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is an adapter (media engine) failure.
    ///
    /// Adapter failures are terminal for the session: the surrounding
    /// application must discard the session and start over rather than
    /// retrying in place.
    pub fn is_adapter_error(&self) -> bool {
        matches!(
            self,
            Error::SdpError(_)
                | Error::IceCandidateError(_)
                | Error::MediaTrackError(_)
                | Error::PeerConnectionError(_)
        )
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Check if this error means the session is unrecoverable
    pub fn is_terminal(&self) -> bool {
        self.is_adapter_error() || matches!(self, Error::SessionAbandoned(_))
    }
}
