//! Remote feed types
//!
//! A feed is one remote video track, corresponding to one captured screen.

pub mod feed_registry;

pub use feed_registry::FeedRegistry;

use serde::Serialize;

/// Media handle held by the session for one remote track
///
/// Implemented by the WebRTC remote-track wrapper and by test doubles. The
/// handle is exclusively owned by the session; `stop` releases whatever the
/// track holds and must be safe to call once per handle on teardown.
pub trait FeedTrack: Send + Sync + 'static {
    /// Transport-level identifier the feed id derives from
    fn transport_id(&self) -> String;

    /// Release resources held by this track
    fn stop(&self);
}

/// Read-only view of one feed, as exposed in session snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedInfo {
    /// Stable identifier, unique within the session
    pub feed_id: String,

    /// Display name supplied by the agent, if any
    pub label: Option<String>,
}
