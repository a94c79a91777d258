//! Signaling channel abstraction
//!
//! A bidirectional, low-latency message relay between viewer and agent,
//! keyed by session identifier. Delivery order is preserved per session but
//! delivery is not guaranteed; the session machine applies timeouts rather
//! than waiting indefinitely.

pub mod memory;
pub mod protocol;

pub use memory::MemorySignaling;
pub use protocol::SignalMessage;

use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Abstract signaling transport
///
/// Implementations must tolerate concurrent use by distinct session
/// identifiers. Subscribing twice for the same session yields two independent
/// deliveries, so callers subscribe at most once per session and dispose on
/// teardown.
#[async_trait]
pub trait SignalingChannel: Send + Sync + 'static {
    /// Enqueue a control message toward the peer for `session_id`
    async fn send(&self, session_id: &str, message: SignalMessage) -> Result<()>;

    /// Open a subscription for messages addressed to this side of `session_id`
    async fn subscribe(&self, session_id: &str) -> Result<SignalingSubscription>;
}

/// Live subscription to one session's incoming messages
///
/// Dropping the subscription releases the underlying listener; `dispose`
/// does the same eagerly and is idempotent.
pub struct SignalingSubscription {
    rx: mpsc::UnboundedReceiver<SignalMessage>,
    disposer: Option<Box<dyn FnOnce() + Send>>,
}

impl SignalingSubscription {
    /// Build a subscription from a receiver and its teardown closure
    pub fn new(
        rx: mpsc::UnboundedReceiver<SignalMessage>,
        disposer: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            rx,
            disposer: Some(Box::new(disposer)),
        }
    }

    /// Receive the next message, in receipt order
    ///
    /// Returns `None` once the subscription is disposed and drained.
    pub async fn recv(&mut self) -> Option<SignalMessage> {
        self.rx.recv().await
    }

    /// Stop delivery and release the underlying listener
    pub fn dispose(&mut self) {
        if let Some(disposer) = self.disposer.take() {
            disposer();
        }
        self.rx.close();
    }
}

impl Drop for SignalingSubscription {
    fn drop(&mut self) {
        self.dispose();
    }
}
