//! Session manager: the crate's entry point for starting and ending
//! viewing sessions
//!
//! Generic over the signaling transport and the negotiator factory so the
//! whole session machinery runs against in-memory doubles in tests and
//! against real WebRTC in production.

use crate::config::ViewerConfig;
use crate::peer::NegotiatorFactory;
use crate::session::session::{spawn, SessionHandle, SessionId};
use crate::signaling::SignalingChannel;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Creates and tracks live viewing sessions
pub struct SessionManager<S: SignalingChannel, F: NegotiatorFactory> {
    signaling: Arc<S>,
    factory: Arc<F>,
    config: ViewerConfig,
    sessions: Arc<RwLock<HashMap<SessionId, SessionHandle>>>,
}

impl<S: SignalingChannel, F: NegotiatorFactory> SessionManager<S, F> {
    /// Create a manager over the given transport and negotiator factory
    pub fn new(signaling: S, factory: F, config: ViewerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            signaling: Arc::new(signaling),
            factory: Arc::new(factory),
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Start a new session against `target_agent_id`
    ///
    /// The only synchronous failure is an invalid target; everything that
    /// can go wrong after that surfaces through the session's own error
    /// state, observable on the returned handle.
    pub async fn start_session(&self, target_agent_id: &str) -> Result<SessionHandle> {
        let target = target_agent_id.trim();
        if target.is_empty() {
            return Err(Error::InvalidTarget(
                "agent identifier must not be empty".to_string(),
            ));
        }

        let session_id = Uuid::new_v4().to_string();
        info!(session_id = %session_id, target = %target, "creating session");

        let handle = spawn(
            Arc::clone(&self.signaling),
            Arc::clone(&self.factory),
            self.config.clone(),
            session_id.clone(),
            target.to_string(),
        );

        let mut sessions = self.sessions.write().await;
        sessions.retain(|id, session| {
            let live = !session.is_finished();
            if !live {
                debug!(session_id = %id, "pruning finished session");
            }
            live
        });
        sessions.insert(session_id, handle.clone());

        Ok(handle)
    }

    /// Look up a live session by id
    pub async fn get_session(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Handles of every tracked session, finished ones excluded
    pub async fn list_sessions(&self) -> Vec<SessionHandle> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|session| !session.is_finished())
            .cloned()
            .collect()
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.list_sessions().await.len()
    }

    /// End one session by id; a no-op for unknown or finished sessions
    pub async fn end_session(&self, session_id: &str) {
        let handle = self.sessions.write().await.remove(session_id);
        if let Some(handle) = handle {
            handle.end().await;
        }
    }

    /// End every tracked session and wait for their disposal
    pub async fn end_all(&self) {
        let handles: Vec<SessionHandle> = self.sessions.write().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.end().await;
        }
    }
}
