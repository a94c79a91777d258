//! Session state machine: pure transition table
//!
//! Every signaling message, negotiator callback and timer expiration is
//! reduced to a [`SessionEvent`] and fed through [`step`], which returns the
//! next state plus the side effects the driver must execute. Keeping the
//! table pure makes every transition testable without a peer connection or
//! a signaling backend.

use crate::peer::PeerState;
use crate::signaling::SignalMessage;
use crate::Error;
use serde::Serialize;
use tracing::debug;

/// Overall status of one viewing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session activity yet
    Idle,
    /// Request sent, awaiting the agent's accept/reject
    Requesting,
    /// Request accepted, awaiting the agent's offer
    Waiting,
    /// Offer/answer exchanged, connection being established
    Connecting,
    /// Connected; feeds are live
    Streaming,
    /// Terminated cleanly (either side)
    Ended,
    /// Terminated by a failure; see `last_error`
    Error,
}

impl SessionState {
    /// Terminal states produce no further network traffic and are followed
    /// by disposal of all session resources.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Ended | SessionState::Error)
    }
}

/// One discrete input to the state machine
#[derive(Debug)]
pub enum SessionEvent {
    /// A message arrived on the signaling subscription
    Signal(SignalMessage),
    /// The negotiator surfaced a remote track (the driver holds the track)
    TrackArrived {
        /// Transport-level identifier of the track
        transport_id: String,
    },
    /// The negotiator discovered a local ICE candidate
    LocalCandidate {
        /// ICE candidate, JSON-encoded
        candidate: String,
    },
    /// The negotiator's connection state changed
    PeerStateChanged(PeerState),
    /// No accept/reject arrived within the request timeout
    RequestTimedOut,
    /// The connection did not reach `connected` within the timeout
    ConnectTimedOut,
    /// The caller invoked `end()`
    EndRequested,
}

/// Side effect the driver executes after a transition
#[derive(Debug, PartialEq, Eq)]
pub enum Effect {
    /// Apply the remote offer and send the local answer over signaling
    SendAnswer {
        /// The remote offer SDP
        offer_sdp: String,
    },
    /// Apply a remote ICE candidate via the negotiator
    AddRemoteCandidate {
        /// ICE candidate, JSON-encoded
        candidate: String,
    },
    /// Trickle a local ICE candidate to the agent over signaling
    SendLocalCandidate {
        /// ICE candidate, JSON-encoded
        candidate: String,
    },
    /// Register the arrived track in the feed registry
    RegisterFeed {
        /// Transport-level identifier, becomes the feed id
        transport_id: String,
    },
    /// Attach (or buffer) a feed label
    ApplyFeedLabel {
        /// Feed the label belongs to
        feed_id: String,
        /// The label itself
        label: Option<String>,
    },
    /// Notify the agent the session is over (best-effort)
    SendEnd,
    /// Start the connection-establishment deadline
    ArmConnectTimer,
    /// Stop the request-acknowledgment deadline
    CancelRequestTimer,
    /// Stop the connection-establishment deadline
    CancelConnectTimer,
    /// Release every session resource (idempotent)
    Dispose,
}

/// Result of one transition
#[derive(Debug)]
pub struct Step {
    /// State after the event
    pub next: SessionState,
    /// Failure to record as `last_error`, when the event was fatal
    pub failure: Option<Error>,
    /// Effects to execute, in order
    pub effects: Vec<Effect>,
}

impl Step {
    fn stay(state: SessionState) -> Self {
        Self {
            next: state,
            failure: None,
            effects: Vec::new(),
        }
    }

    fn to(next: SessionState) -> Self {
        Self {
            next,
            failure: None,
            effects: Vec::new(),
        }
    }

    fn fail(error: Error) -> Self {
        Self {
            next: SessionState::Error,
            failure: Some(error),
            effects: Vec::new(),
        }
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Apply one event to the machine
///
/// Combinations outside the transition table are ignored: the state is
/// unchanged and no effects are produced.
pub fn step(state: SessionState, event: SessionEvent) -> Step {
    use SessionState::{Connecting, Ended, Requesting, Streaming, Waiting};

    match (state, event) {
        // Caller-initiated end wins from every non-terminal state.
        (s, SessionEvent::EndRequested) if !s.is_terminal() => Step::to(Ended)
            .with(Effect::SendEnd)
            .with(Effect::Dispose),

        (Requesting, SessionEvent::Signal(SignalMessage::Accepted)) => {
            Step::to(Waiting).with(Effect::CancelRequestTimer)
        }
        (Requesting, SessionEvent::Signal(SignalMessage::Rejected)) => {
            Step::fail(Error::RequestRejected).with(Effect::Dispose)
        }
        (Requesting, SessionEvent::RequestTimedOut) => {
            Step::fail(Error::RequestTimeout).with(Effect::Dispose)
        }

        (Waiting, SessionEvent::Signal(SignalMessage::Offer { sdp })) => Step::to(Connecting)
            .with(Effect::SendAnswer { offer_sdp: sdp })
            .with(Effect::ArmConnectTimer),

        // Tracks register without a state change; monitors keep trickling in
        // after the connection reports connected.
        (Connecting | Streaming, SessionEvent::TrackArrived { transport_id }) => {
            Step::stay(state).with(Effect::RegisterFeed { transport_id })
        }

        (Connecting, SessionEvent::PeerStateChanged(PeerState::Connected)) => {
            Step::to(Streaming).with(Effect::CancelConnectTimer)
        }

        (
            Connecting | Streaming,
            SessionEvent::Signal(SignalMessage::IceCandidate { candidate }),
        ) => Step::stay(state).with(Effect::AddRemoteCandidate { candidate }),

        (Connecting | Streaming, SessionEvent::LocalCandidate { candidate }) => {
            Step::stay(state).with(Effect::SendLocalCandidate { candidate })
        }

        // Labels may outrun the offer itself; the registry buffers them
        // until the track arrives, so accept them as soon as the agent has
        // agreed to stream.
        (
            Waiting | Connecting | Streaming,
            SessionEvent::Signal(SignalMessage::FeedMeta { feed_id, label }),
        ) => Step::stay(state).with(Effect::ApplyFeedLabel { feed_id, label }),

        (Connecting | Streaming, SessionEvent::PeerStateChanged(PeerState::Failed)) => {
            Step::fail(Error::ConnectionLost).with(Effect::Dispose)
        }
        (Connecting | Streaming, SessionEvent::ConnectTimedOut) => {
            Step::fail(Error::ConnectionTimeout).with(Effect::Dispose)
        }

        (Streaming, SessionEvent::Signal(SignalMessage::End { .. })) => {
            Step::to(Ended).with(Effect::Dispose)
        }

        (state, event) => {
            debug!(?state, ?event, "ignoring event outside transition table");
            Step::stay(state)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::Error;
    use SessionState::*;

    fn signal(message: SignalMessage) -> SessionEvent {
        SessionEvent::Signal(message)
    }

    #[test]
    fn test_accept_moves_requesting_to_waiting() {
        let outcome = step(Requesting, signal(SignalMessage::Accepted));
        assert_eq!(outcome.next, Waiting);
        assert!(outcome.failure.is_none());
        assert_eq!(outcome.effects, vec![Effect::CancelRequestTimer]);
    }

    #[test]
    fn test_reject_fails_requesting() {
        let outcome = step(Requesting, signal(SignalMessage::Rejected));
        assert_eq!(outcome.next, Error);
        assert_eq!(outcome.failure.unwrap().to_string(), "request rejected");
        assert_eq!(outcome.effects, vec![Effect::Dispose]);
    }

    #[test]
    fn test_request_timeout_fails_requesting() {
        let outcome = step(Requesting, SessionEvent::RequestTimedOut);
        assert_eq!(outcome.next, Error);
        assert_eq!(outcome.failure.unwrap().to_string(), "no response from agent");
        assert_eq!(outcome.effects, vec![Effect::Dispose]);
    }

    #[test]
    fn test_offer_moves_waiting_to_connecting() {
        let outcome = step(
            Waiting,
            signal(SignalMessage::Offer {
                sdp: "sdpA".to_string(),
            }),
        );
        assert_eq!(outcome.next, Connecting);
        assert_eq!(
            outcome.effects,
            vec![
                Effect::SendAnswer {
                    offer_sdp: "sdpA".to_string()
                },
                Effect::ArmConnectTimer
            ]
        );
    }

    #[test]
    fn test_track_registers_without_state_change() {
        for state in [Connecting, Streaming] {
            let outcome = step(
                state,
                SessionEvent::TrackArrived {
                    transport_id: "t1".to_string(),
                },
            );
            assert_eq!(outcome.next, state);
            assert_eq!(
                outcome.effects,
                vec![Effect::RegisterFeed {
                    transport_id: "t1".to_string()
                }]
            );
        }
    }

    #[test]
    fn test_connected_moves_connecting_to_streaming() {
        let outcome = step(Connecting, SessionEvent::PeerStateChanged(PeerState::Connected));
        assert_eq!(outcome.next, Streaming);
        assert_eq!(outcome.effects, vec![Effect::CancelConnectTimer]);
    }

    #[test]
    fn test_candidates_and_labels_keep_state() {
        for state in [Connecting, Streaming] {
            let outcome = step(
                state,
                signal(SignalMessage::IceCandidate {
                    candidate: "c1".to_string(),
                }),
            );
            assert_eq!(outcome.next, state);
        }

        // Labels are accepted from the moment the agent agrees to stream;
        // the registry buffers any received before their track.
        for state in [Waiting, Connecting, Streaming] {
            let outcome = step(
                state,
                signal(SignalMessage::FeedMeta {
                    feed_id: "t1".to_string(),
                    label: Some("Screen 1".to_string()),
                }),
            );
            assert_eq!(outcome.next, state);
            assert_eq!(
                outcome.effects,
                vec![Effect::ApplyFeedLabel {
                    feed_id: "t1".to_string(),
                    label: Some("Screen 1".to_string())
                }]
            );
        }
    }

    #[test]
    fn test_failed_connection_is_fatal() {
        for state in [Connecting, Streaming] {
            let outcome = step(state, SessionEvent::PeerStateChanged(PeerState::Failed));
            assert_eq!(outcome.next, Error);
            assert_eq!(outcome.failure.unwrap().to_string(), "connection lost");
            assert_eq!(outcome.effects, vec![Effect::Dispose]);
        }
    }

    #[test]
    fn test_connect_timeout_is_fatal() {
        let outcome = step(Connecting, SessionEvent::ConnectTimedOut);
        assert_eq!(outcome.next, Error);
        assert_eq!(outcome.failure.unwrap().to_string(), "connection timed out");
    }

    #[test]
    fn test_remote_end_moves_streaming_to_ended() {
        let outcome = step(Streaming, signal(SignalMessage::End { reason: None }));
        assert_eq!(outcome.next, Ended);
        assert!(outcome.failure.is_none());
        assert_eq!(outcome.effects, vec![Effect::Dispose]);
    }

    #[test]
    fn test_caller_end_works_from_every_non_terminal_state() {
        for state in [Idle, Requesting, Waiting, Connecting, Streaming] {
            let outcome = step(state, SessionEvent::EndRequested);
            assert_eq!(outcome.next, Ended);
            assert_eq!(outcome.effects, vec![Effect::SendEnd, Effect::Dispose]);
        }
    }

    #[test]
    fn test_end_in_terminal_state_is_ignored() {
        for state in [Ended, Error] {
            let outcome = step(state, SessionEvent::EndRequested);
            assert_eq!(outcome.next, state);
            assert!(outcome.effects.is_empty());
        }
    }

    #[test]
    fn test_events_outside_table_are_ignored() {
        // A stray offer while still requesting.
        let outcome = step(
            Requesting,
            signal(SignalMessage::Offer {
                sdp: "early".to_string(),
            }),
        );
        assert_eq!(outcome.next, Requesting);
        assert!(outcome.effects.is_empty());

        // Timers fire only in the state that armed them.
        let outcome = step(Waiting, SessionEvent::RequestTimedOut);
        assert_eq!(outcome.next, Waiting);

        // Terminal states accept no further automatic transitions.
        for state in [Ended, Error] {
            let outcome = step(state, signal(SignalMessage::Accepted));
            assert_eq!(outcome.next, state);
            let outcome = step(state, SessionEvent::PeerStateChanged(PeerState::Failed));
            assert_eq!(outcome.next, state);
        }
    }

    #[test]
    fn test_terminal_predicate() {
        assert!(Ended.is_terminal());
        assert!(Error.is_terminal());
        for state in [Idle, Requesting, Waiting, Connecting, Streaming] {
            assert!(!state.is_terminal());
        }
    }
}
