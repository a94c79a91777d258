//! Viewer-side session manager for live screen viewing
//!
//! This crate turns "watch this agent's screen" into a fully negotiated
//! multi-feed WebRTC session: it requests permission over a signaling
//! channel, answers the agent's offer, collects the incoming screen feeds
//! and exposes the whole thing as an observable session.
//!
//! # Features
//!
//! - **Negotiated sessions**: request/accept handshake before any media flows
//! - **Multi-feed**: every screen the agent shares arrives as its own feed,
//!   labeled via `feed-meta` messages
//! - **Deterministic lifecycle**: a pure transition table drives
//!   `requesting → waiting → connecting → streaming`, with mandatory
//!   request and connection timeouts
//! - **Observable**: each session publishes `{state, feeds, error}`
//!   snapshots over a `watch` channel
//! - **Pluggable transports**: signaling and peer negotiation sit behind
//!   traits, with an in-memory signaling hub for tests
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  SessionManager                                      │
//! │  ├─ SignalingChannel (request/accept, SDP, ICE)      │
//! │  ├─ NegotiatorFactory → Negotiator (one per session) │
//! │  └─ Session driver (one task per session)            │
//! │      ├─ state machine (pure transition table)        │
//! │      ├─ FeedRegistry (ordered, labeled feeds)        │
//! │      └─ watch::Sender<SessionSnapshot>               │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use deskwatch::{SessionManager, ViewerConfig, WebRtcNegotiatorFactory};
//!
//! let config = ViewerConfig::default();
//! let factory = WebRtcNegotiatorFactory::new(config.clone());
//! let manager = SessionManager::new(signaling, factory, config)?;
//!
//! let session = manager.start_session("agent-abc123").await?;
//! let mut updates = session.watch();
//! while updates.changed().await.is_ok() {
//!     let snapshot = updates.borrow().clone();
//!     println!("{:?}: {} feeds", snapshot.state, snapshot.feeds.len());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod presentation;
pub mod session;
pub mod signaling;

// Re-exports for public API
pub use config::{TurnServerConfig, ViewerConfig};
pub use error::{Error, Result};
pub use media::{FeedInfo, FeedTrack};
pub use peer::webrtc::{WebRtcNegotiator, WebRtcNegotiatorFactory};
pub use peer::{Negotiator, NegotiatorEvent, NegotiatorFactory, PeerState};
pub use session::{SessionHandle, SessionId, SessionManager, SessionSnapshot, SessionState};
pub use signaling::{MemorySignaling, SignalMessage, SignalingChannel, SignalingSubscription};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
