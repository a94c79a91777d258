//! Configuration types for the viewer

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for viewing sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Bounded wait for the agent to accept or reject a request, in seconds
    pub request_timeout_secs: u64,

    /// Bounded wait for the peer connection to report connected, in seconds
    pub connect_timeout_secs: u64,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn:// or turns://)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            request_timeout_secs: 15,
            connect_timeout_secs: 30,
        }
    }
}

impl ViewerConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `stun_servers` is empty
    /// - either timeout is zero
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "request_timeout_secs must be non-zero".to_string(),
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "connect_timeout_secs must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Request-acknowledgment timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Connection-establishment timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
