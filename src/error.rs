//! Error types for the viewing session manager

/// Result type alias using the crate Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while establishing or running a viewing session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller supplied an empty or invalid agent identifier
    #[error("invalid target agent: {0}")]
    InvalidTarget(String),

    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Agent declined the viewing request
    #[error("request rejected")]
    RequestRejected,

    /// Agent never acknowledged the viewing request
    #[error("no response from agent")]
    RequestTimeout,

    /// Negotiation did not reach `connected` in time
    #[error("connection timed out")]
    ConnectionTimeout,

    /// Established connection failed mid-stream
    #[error("connection lost")]
    ConnectionLost,

    /// Malformed or mis-sequenced offer/answer exchange
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// Signaling channel error
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// WebRTC peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnection(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidate(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Errors that terminate a session by transitioning it into the
    /// `Error` state rather than crossing the control-surface boundary.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Error::RequestRejected
                | Error::RequestTimeout
                | Error::ConnectionTimeout
                | Error::ConnectionLost
                | Error::Negotiation(_)
                | Error::PeerConnection(_)
        )
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Check if this error is synchronous caller misuse
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Error::InvalidTarget(_) | Error::InvalidConfig(_))
    }
}
