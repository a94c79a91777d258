//! In-process signaling relay
//!
//! Connects the two endpoints of a signaling channel inside one process:
//! tests and local agent loops on one side, the session machine on the other.
//! A remote store/pub-sub backend plugs in behind the same
//! [`SignalingChannel`] trait.

use super::{SignalMessage, SignalingChannel, SignalingSubscription};
use crate::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Which endpoint of the relay this handle represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Endpoint {
    Viewer,
    Agent,
}

impl Endpoint {
    fn peer(self) -> Endpoint {
        match self {
            Endpoint::Viewer => Endpoint::Agent,
            Endpoint::Agent => Endpoint::Viewer,
        }
    }
}

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<SignalMessage>,
}

#[derive(Default)]
struct Hub {
    // Subscribers keyed by (session, receiving endpoint). Message order is
    // preserved per session because every delivery happens under this lock.
    subscribers: Mutex<HashMap<(String, Endpoint), Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl Hub {
    fn deliver(&self, session_id: &str, to: Endpoint, message: SignalMessage) {
        let mut subscribers = self.subscribers.lock();
        let Some(subs) = subscribers.get_mut(&(session_id.to_string(), to)) else {
            // Nobody listening: the relay drops silently, like a partitioned
            // network. The session machine times out instead of waiting.
            debug!(session_id, kind = message.kind(), "dropping signal, no subscriber");
            return;
        };

        subs.retain(|sub| sub.tx.send(message.clone()).is_ok());
    }

    fn unsubscribe(&self, session_id: &str, endpoint: Endpoint, id: u64) {
        let mut subscribers = self.subscribers.lock();
        if let Some(subs) = subscribers.get_mut(&(session_id.to_string(), endpoint)) {
            subs.retain(|sub| sub.id != id);
            if subs.is_empty() {
                subscribers.remove(&(session_id.to_string(), endpoint));
            }
        }
    }
}

/// In-memory [`SignalingChannel`] endpoint
///
/// Create a connected pair with [`MemorySignaling::pair`]; messages sent on
/// one endpoint are delivered, in order, to subscribers on the other.
#[derive(Clone)]
pub struct MemorySignaling {
    hub: Arc<Hub>,
    endpoint: Endpoint,
}

impl MemorySignaling {
    /// Create a connected (viewer, agent) endpoint pair
    pub fn pair() -> (MemorySignaling, MemorySignaling) {
        let hub = Arc::new(Hub::default());
        (
            MemorySignaling {
                hub: Arc::clone(&hub),
                endpoint: Endpoint::Viewer,
            },
            MemorySignaling {
                hub,
                endpoint: Endpoint::Agent,
            },
        )
    }
}

#[async_trait]
impl SignalingChannel for MemorySignaling {
    async fn send(&self, session_id: &str, message: SignalMessage) -> Result<()> {
        debug!(session_id, kind = message.kind(), "sending signal");
        self.hub.deliver(session_id, self.endpoint.peer(), message);
        Ok(())
    }

    async fn subscribe(&self, session_id: &str) -> Result<SignalingSubscription> {
        let id = self.hub.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        self.hub
            .subscribers
            .lock()
            .entry((session_id.to_string(), self.endpoint))
            .or_default()
            .push(Subscriber { id, tx });

        debug!(session_id, subscriber = id, "signaling subscription opened");

        let hub = Arc::clone(&self.hub);
        let endpoint = self.endpoint;
        let session = session_id.to_string();
        Ok(SignalingSubscription::new(rx, move || {
            debug!(session_id = %session, subscriber = id, "signaling subscription disposed");
            hub.unsubscribe(&session, endpoint, id);
        }))
    }
}
