//! Session-control wire messages
//!
//! The message kinds and field names are the transmitted contract with the
//! agent-side counterpart; they must not be renamed.

use serde::{Deserialize, Serialize};

/// Control message exchanged over the signaling channel for one session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// Viewer asks the agent to start a viewing session
    Request,

    /// Agent accepted the request; offer/answer exchange follows
    Accepted,

    /// Agent declined the request
    Rejected,

    /// SDP offer (agent -> viewer)
    Offer {
        /// Session description
        sdp: String,
    },

    /// SDP answer (viewer -> agent)
    Answer {
        /// Session description
        sdp: String,
    },

    /// Trickled ICE candidate (either direction)
    IceCandidate {
        /// ICE candidate, JSON-encoded
        candidate: String,
    },

    /// Display metadata for one feed (may arrive before the track itself)
    FeedMeta {
        /// Feed identifier, matching the track's transport-level identifier
        #[serde(rename = "feedId")]
        feed_id: String,

        /// Human-readable label, e.g. "Screen 2"
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },

    /// Session terminated by the sender
    End {
        /// Optional termination reason
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl SignalMessage {
    /// Convert message to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::Serialization(format!("Failed to serialize signal message: {}", e))
        })
    }

    /// Parse message from JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::Serialization(format!("Failed to deserialize signal message: {}", e))
        })
    }

    /// Wire name of the message kind
    pub fn kind(&self) -> &'static str {
        match self {
            SignalMessage::Request => "request",
            SignalMessage::Accepted => "accepted",
            SignalMessage::Rejected => "rejected",
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::IceCandidate { .. } => "ice-candidate",
            SignalMessage::FeedMeta { .. } => "feed-meta",
            SignalMessage::End { .. } => "end",
        }
    }
}
