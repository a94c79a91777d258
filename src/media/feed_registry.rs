//! Feed registry: per-session map from feed id to remote track
//!
//! Owned by the session driver task, so it needs no interior locking.
//! Rebuilt from scratch every session; never shared across sessions.

use super::{FeedInfo, FeedTrack};
use std::collections::HashMap;
use tracing::{debug, info};

struct Feed<T> {
    feed_id: String,
    label: Option<String>,
    track: T,
}

/// Insertion-ordered registry of the session's active feeds
pub struct FeedRegistry<T: FeedTrack> {
    session_id: String,

    /// Feeds in arrival order, for deterministic presentation
    feeds: Vec<Feed<T>>,

    /// Labels from `feed-meta` messages that arrived before their track;
    /// applied retroactively on upsert, drained on clear. Bounded by the
    /// session's connection timeout.
    pending_labels: HashMap<String, Option<String>>,
}

impl<T: FeedTrack> FeedRegistry<T> {
    /// Create an empty registry for one session
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            feeds: Vec::new(),
            pending_labels: HashMap::new(),
        }
    }

    /// Register a feed for an arrived track
    ///
    /// Returns `false` (and stops the incoming track) when a feed with the
    /// same id is already registered: at most one feed per transport
    /// identifier. A label buffered for this feed id is applied on insert.
    pub fn upsert(&mut self, feed_id: &str, track: T, label: Option<String>) -> bool {
        if self.feeds.iter().any(|f| f.feed_id == feed_id) {
            debug!(
                session_id = %self.session_id,
                feed_id, "duplicate track arrival, keeping existing feed"
            );
            track.stop();
            return false;
        }

        let label = label.or_else(|| self.pending_labels.remove(feed_id).flatten());

        self.feeds.push(Feed {
            feed_id: feed_id.to_string(),
            label,
            track,
        });

        info!(
            session_id = %self.session_id,
            feed_id,
            total = self.feeds.len(),
            "registered feed"
        );

        true
    }

    /// Attach a label to the matching feed
    ///
    /// If the feed has not arrived yet the label is buffered and applied
    /// once it does (tracks and metadata may arrive out of order). Returns
    /// `true` when the label was applied to a live feed.
    pub fn apply_label(&mut self, feed_id: &str, label: Option<String>) -> bool {
        if let Some(feed) = self.feeds.iter_mut().find(|f| f.feed_id == feed_id) {
            feed.label = label;
            true
        } else {
            debug!(
                session_id = %self.session_id,
                feed_id, "buffering label for feed not yet arrived"
            );
            self.pending_labels.insert(feed_id.to_string(), label);
            false
        }
    }

    /// Stop and remove one feed
    pub fn remove(&mut self, feed_id: &str) -> bool {
        if let Some(pos) = self.feeds.iter().position(|f| f.feed_id == feed_id) {
            let feed = self.feeds.remove(pos);
            feed.track.stop();
            info!(session_id = %self.session_id, feed_id, "removed feed");
            true
        } else {
            false
        }
    }

    /// Feeds in insertion order
    pub fn snapshot(&self) -> Vec<FeedInfo> {
        self.feeds
            .iter()
            .map(|f| FeedInfo {
                feed_id: f.feed_id.clone(),
                label: f.label.clone(),
            })
            .collect()
    }

    /// Number of active feeds
    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    /// Whether the registry holds no feeds
    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Stop every track and drop all state (disposal path)
    pub fn clear(&mut self) {
        for feed in self.feeds.drain(..) {
            feed.track.stop();
        }
        self.pending_labels.clear();
        debug!(session_id = %self.session_id, "cleared feed registry");
    }
}
