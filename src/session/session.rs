//! Session driver: owns one session's resources and runs its event loop
//!
//! All inputs (signaling messages, negotiator events, timers, caller
//! control) funnel into a single `select!` loop, so transitions are applied
//! strictly one at a time. Observers read the session through a `watch`
//! channel carrying [`SessionSnapshot`] values.

use crate::config::ViewerConfig;
use crate::media::{FeedInfo, FeedRegistry, FeedTrack};
use crate::peer::{Negotiator, NegotiatorEvent, NegotiatorFactory};
use crate::session::state::{step, Effect, SessionEvent, SessionState};
use crate::signaling::{SignalMessage, SignalingChannel, SignalingSubscription};
use crate::Error;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Unique identifier for one viewing session
pub type SessionId = String;

/// Point-in-time view of a session, published on every change
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Current state
    pub state: SessionState,
    /// Registered feeds, in arrival order
    pub feeds: Vec<FeedInfo>,
    /// Message of the failure that terminated the session, if any
    pub error: Option<String>,
}

impl SessionSnapshot {
    fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            feeds: Vec::new(),
            error: None,
        }
    }
}

/// Caller-side request delivered to the driver loop
pub(crate) enum ControlRequest {
    /// Terminate the session; `ack` resolves once disposal completes
    End { ack: oneshot::Sender<()> },
}

/// Cloneable handle to a running session
///
/// Dropping every handle does not end the session; call [`end`] for that.
///
/// [`end`]: SessionHandle::end
#[derive(Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    target_agent_id: String,
    control_tx: mpsc::UnboundedSender<ControlRequest>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    done_rx: watch::Receiver<bool>,
}

impl SessionHandle {
    /// The session's unique id, also its signaling routing key
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The agent this session targets
    pub fn target_agent_id(&self) -> &str {
        &self.target_agent_id
    }

    /// Current snapshot of the session
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// A receiver that yields a new snapshot on every observable change
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Whether the session has reached a terminal state and been disposed
    pub fn is_finished(&self) -> bool {
        *self.done_rx.borrow()
    }

    /// End the session
    ///
    /// Safe to call from any state and any number of times, concurrently
    /// included. Resolves once disposal has completed; never errors.
    pub async fn end(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .control_tx
            .send(ControlRequest::End { ack: ack_tx })
            .is_ok()
        {
            // The driver acks after disposal; a dropped ack just means the
            // driver finished through another path.
            let _ = ack_rx.await;
        }
        let mut done = self.done_rx.clone();
        while !*done.borrow_and_update() {
            if done.changed().await.is_err() {
                break;
            }
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .field("target_agent_id", &self.target_agent_id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Start a session against `target_agent_id` and return its handle
///
/// The returned handle is live immediately; subscription setup and the
/// initial `request` message happen on the spawned driver task, and any
/// failure there surfaces as the session's error state rather than a
/// returned error.
pub(crate) fn spawn<S, F>(
    signaling: Arc<S>,
    factory: Arc<F>,
    config: ViewerConfig,
    session_id: SessionId,
    target_agent_id: String,
) -> SessionHandle
where
    S: SignalingChannel,
    F: NegotiatorFactory,
{
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::idle());
    let (done_tx, done_rx) = watch::channel(false);

    let handle = SessionHandle {
        session_id: session_id.clone(),
        target_agent_id: target_agent_id.clone(),
        control_tx,
        snapshot_rx,
        done_rx,
    };

    tokio::spawn(async move {
        info!(session_id = %session_id, target = %target_agent_id, "starting session");

        let subscription = match signaling.subscribe(&session_id).await {
            Ok(subscription) => subscription,
            Err(e) => return abort_startup(&session_id, &snapshot_tx, &done_tx, e),
        };

        let (negotiator, negotiator_rx) = match factory.create(&session_id).await {
            Ok(created) => created,
            Err(e) => return abort_startup(&session_id, &snapshot_tx, &done_tx, e),
        };

        if let Err(e) = signaling.send(&session_id, SignalMessage::Request).await {
            negotiator.close().await;
            return abort_startup(&session_id, &snapshot_tx, &done_tx, e);
        }

        let registry = FeedRegistry::new(session_id.clone());
        let mut session = Session {
            request_deadline: Some(Instant::now() + config.request_timeout()),
            connect_deadline: None,
            session_id,
            config,
            signaling,
            subscription,
            negotiator,
            negotiator_rx,
            registry,
            state: SessionState::Requesting,
            last_error: None,
            control_rx,
            pending_acks: Vec::new(),
            snapshot_tx,
            done_tx,
            disposed: false,
        };
        session.publish();
        session.run().await;
    });

    handle
}

fn abort_startup(
    session_id: &str,
    snapshot_tx: &watch::Sender<SessionSnapshot>,
    done_tx: &watch::Sender<bool>,
    error: Error,
) {
    warn!(session_id = %session_id, "session startup failed: {}", error);
    snapshot_tx.send_replace(SessionSnapshot {
        state: SessionState::Error,
        feeds: Vec::new(),
        error: Some(error.to_string()),
    });
    done_tx.send_replace(true);
}

/// The driver itself; lives on its own task until the session terminates
struct Session<S: SignalingChannel, N: Negotiator> {
    session_id: SessionId,
    config: ViewerConfig,
    signaling: Arc<S>,
    subscription: SignalingSubscription,
    negotiator: N,
    negotiator_rx: mpsc::UnboundedReceiver<NegotiatorEvent<N::Track>>,
    registry: FeedRegistry<N::Track>,
    state: SessionState,
    last_error: Option<String>,
    request_deadline: Option<Instant>,
    connect_deadline: Option<Instant>,
    control_rx: mpsc::UnboundedReceiver<ControlRequest>,
    pending_acks: Vec<oneshot::Sender<()>>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    done_tx: watch::Sender<bool>,
    disposed: bool,
}

impl<S: SignalingChannel, N: Negotiator> Session<S, N> {
    async fn run(mut self) {
        while !self.state.is_terminal() {
            let (event, track): (SessionEvent, Option<N::Track>) = tokio::select! {
                biased;

                Some(ControlRequest::End { ack }) = self.control_rx.recv() => {
                    self.pending_acks.push(ack);
                    (SessionEvent::EndRequested, None)
                }

                _ = tokio::time::sleep_until(
                    self.request_deadline.unwrap_or_else(Instant::now)
                ), if self.request_deadline.is_some() => {
                    self.request_deadline = None;
                    (SessionEvent::RequestTimedOut, None)
                }

                _ = tokio::time::sleep_until(
                    self.connect_deadline.unwrap_or_else(Instant::now)
                ), if self.connect_deadline.is_some() => {
                    self.connect_deadline = None;
                    (SessionEvent::ConnectTimedOut, None)
                }

                Some(message) = self.subscription.recv() => {
                    (SessionEvent::Signal(message), None)
                }

                Some(event) = self.negotiator_rx.recv() => match event {
                    NegotiatorEvent::TrackArrived { transport_id, track } => {
                        (SessionEvent::TrackArrived { transport_id }, Some(track))
                    }
                    NegotiatorEvent::LocalCandidate { candidate } => {
                        (SessionEvent::LocalCandidate { candidate }, None)
                    }
                    NegotiatorEvent::StateChanged(peer_state) => {
                        (SessionEvent::PeerStateChanged(peer_state), None)
                    }
                },

                else => break,
            };

            self.dispatch(event, track).await;
        }

        // Safety net for the `else` exit; normal paths dispose via effects.
        self.dispose().await;
        self.publish();
        for ack in self.pending_acks.drain(..) {
            let _ = ack.send(());
        }
        self.done_tx.send_replace(true);
        info!(session_id = %self.session_id, state = ?self.state, "session finished");
    }

    async fn dispatch(&mut self, event: SessionEvent, mut track: Option<N::Track>) {
        let step = step(self.state, event);
        if step.next != self.state {
            debug!(
                session_id = %self.session_id,
                from = ?self.state,
                to = ?step.next,
                "state transition"
            );
        }
        self.state = step.next;
        if let Some(error) = step.failure {
            warn!(session_id = %self.session_id, "session failed: {}", error);
            self.last_error = Some(error.to_string());
        }
        for effect in step.effects {
            self.run_effect(effect, &mut track).await;
        }
        // A track the table produced no RegisterFeed for was refused.
        if let Some(refused) = track.take() {
            debug!(session_id = %self.session_id, "stopping track refused by current state");
            refused.stop();
        }
        self.publish();
    }

    async fn run_effect(&mut self, effect: Effect, track: &mut Option<N::Track>) {
        match effect {
            Effect::SendAnswer { offer_sdp } => match self.negotiator.answer_offer(offer_sdp).await
            {
                Ok(sdp) => {
                    let message = SignalMessage::Answer { sdp };
                    if let Err(e) = self.signaling.send(&self.session_id, message).await {
                        self.fail(Error::Signaling(format!("failed to send answer: {}", e)))
                            .await;
                    }
                }
                Err(e) => self.fail(e).await,
            },
            Effect::AddRemoteCandidate { candidate } => {
                // Malformed candidates are dropped, not fatal.
                if let Err(e) = self.negotiator.add_remote_candidate(candidate).await {
                    warn!(session_id = %self.session_id, "ignoring remote candidate: {}", e);
                }
            }
            Effect::SendLocalCandidate { candidate } => {
                let message = SignalMessage::IceCandidate { candidate };
                if let Err(e) = self.signaling.send(&self.session_id, message).await {
                    warn!(session_id = %self.session_id, "failed to trickle candidate: {}", e);
                }
            }
            Effect::RegisterFeed { transport_id } => match track.take() {
                Some(track) => {
                    self.registry.upsert(&transport_id, track, None);
                }
                None => {
                    warn!(session_id = %self.session_id, %transport_id, "track event carried no track")
                }
            },
            Effect::ApplyFeedLabel { feed_id, label } => {
                self.registry.apply_label(&feed_id, label);
            }
            Effect::SendEnd => {
                let message = SignalMessage::End { reason: None };
                if let Err(e) = self.signaling.send(&self.session_id, message).await {
                    debug!(session_id = %self.session_id, "end notification not delivered: {}", e);
                }
            }
            Effect::ArmConnectTimer => {
                self.connect_deadline = Some(Instant::now() + self.config.connect_timeout());
            }
            Effect::CancelRequestTimer => {
                self.request_deadline = None;
            }
            Effect::CancelConnectTimer => {
                self.connect_deadline = None;
            }
            Effect::Dispose => {
                self.dispose().await;
            }
        }
    }

    /// Record a failure discovered while executing an effect and tear down.
    async fn fail(&mut self, error: Error) {
        if self.disposed {
            return;
        }
        warn!(session_id = %self.session_id, "session error: {}", error);
        self.state = SessionState::Error;
        self.last_error = Some(error.to_string());
        self.dispose().await;
    }

    /// Release every session resource. Idempotent; safe under every exit
    /// path including repeated `end()` calls.
    async fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.request_deadline = None;
        self.connect_deadline = None;
        self.subscription.dispose();
        self.negotiator.close().await;
        self.registry.clear();
        debug!(session_id = %self.session_id, "session disposed");
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(SessionSnapshot {
            state: self.state,
            feeds: self.registry.snapshot(),
            error: self.last_error.clone(),
        });
    }
}
