//! Peer connection negotiation
//!
//! One negotiator per session owns the underlying real-time peer connection,
//! performs offer/answer exchange and ICE candidate trickling, and surfaces
//! remote media tracks as they arrive.

pub mod webrtc;

pub use self::webrtc::{RemoteScreenTrack, WebRtcNegotiator, WebRtcNegotiatorFactory};

use crate::media::FeedTrack;
use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Connection state reported by the negotiator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Negotiation in progress
    Connecting,
    /// Connection established
    Connected,
    /// Connection failed; surfaced as a session-level error, never retried
    /// inside the negotiator
    Failed,
    /// Connection closed
    Closed,
}

/// Event emitted by a negotiator, delivered in transport order
#[derive(Debug)]
pub enum NegotiatorEvent<T> {
    /// A remote media track arrived
    TrackArrived {
        /// Transport-level identifier the feed id derives from
        transport_id: String,
        /// The track itself, exclusively owned by the session from here on
        track: T,
    },
    /// A local ICE candidate was discovered and should be trickled to the
    /// agent over signaling
    LocalCandidate {
        /// ICE candidate, JSON-encoded
        candidate: String,
    },
    /// The underlying connection changed state
    StateChanged(PeerState),
}

/// Offer/answer + ICE driver for exactly one peer connection
#[async_trait]
pub trait Negotiator: Send + Sync + 'static {
    /// Remote track type surfaced by this negotiator
    type Track: FeedTrack;

    /// Produce a local session description
    ///
    /// The viewer is receive-only, so sessions normally answer instead;
    /// fails with [`crate::Error::Negotiation`] after the connection closed.
    async fn create_offer(&self) -> Result<String>;

    /// Apply a remote offer and return the local answer SDP
    ///
    /// Candidates queued before the remote description existed are flushed
    /// once application succeeds.
    async fn answer_offer(&self, offer_sdp: String) -> Result<String>;

    /// Apply an ICE candidate, buffering it if the remote description is
    /// not yet set
    async fn add_remote_candidate(&self, candidate: String) -> Result<()>;

    /// Release the peer connection and all transport resources; idempotent
    async fn close(&self);
}

/// Per-session negotiator construction
#[async_trait]
pub trait NegotiatorFactory: Send + Sync + 'static {
    /// Negotiator type produced by this factory
    type Negotiator: Negotiator;

    /// Create a negotiator and its event stream for one session
    #[allow(clippy::type_complexity)]
    async fn create(
        &self,
        session_id: &str,
    ) -> Result<(
        Self::Negotiator,
        mpsc::UnboundedReceiver<NegotiatorEvent<<Self::Negotiator as Negotiator>::Track>>,
    )>;
}
