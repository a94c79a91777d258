//! User-facing status copy for each session state

use crate::session::SessionState;

/// Short status line a frontend can show for `state`
pub fn status_copy(state: SessionState) -> &'static str {
    match state {
        SessionState::Idle => "Not viewing",
        SessionState::Requesting => "Contacting agent...",
        SessionState::Waiting => "Waiting for the agent to start streaming...",
        SessionState::Connecting => "Establishing connection...",
        SessionState::Streaming => "Live",
        SessionState::Ended => "Session ended",
        SessionState::Error => "Connection problem",
    }
}
